//! 置換表モジュール
//!
//! 探索結果をキャッシュする置換表（Transposition Table）。
//!
//! - `TTEntry`: エントリ（10バイト、16bitキー）
//! - `Cluster`: エントリのグループ（32バイト、3エントリ + 共有extraビット）
//! - `TranspositionTable`: テーブル本体
//! - 世代管理
//! - prefetch
//!
//! # クラスター構成
//!
//! クラスターインデックスは64bitキーと cluster_count の widening 乗算の
//! 上位64bitで決定し、クラスター内マッチングに下位16bitを使用する。
//! 10バイトエントリ × 3 + 16bit extra = 32バイト/クラスター。
//! cut フラグのようなエントリ毎の1bit情報は extra に相乗りさせ、
//! エントリ本体を10バイトに保つ。

mod alloc;
mod cluster;
mod entry;
mod table;

pub use entry::TTData;
pub use table::{ProbeResult, TranspositionTable};

/// クラスターサイズ（エントリ数）
/// 10bytes × 3 + 2bytes extra = 32bytes
pub const CLUSTER_SIZE: usize = 3;

/// Generation関連の定数
///
/// 世代カウンターは8bitで、下位 GENERATION_BITS ビットをフラグ用に空けて
/// GENERATION_DELTA 刻みで増える。256でラップする。
pub const GENERATION_BITS: u32 = 3;
pub const GENERATION_DELTA: u8 = 1 << GENERATION_BITS; // 8
pub const GENERATION_CYCLE: u16 = 255 + GENERATION_DELTA as u16;
pub const GENERATION_MASK: u16 = 0xF8; // (0xFF << GENERATION_BITS) as u8
