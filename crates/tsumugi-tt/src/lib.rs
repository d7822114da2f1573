//! 共有置換表（Transposition Table）ライブラリ
//!
//! 並列ゲーム木探索エンジンのための、プロセス全体で共有する固定サイズの
//! 連想メモリ。64bit局面ハッシュをキーに、最善手・値の境界・静的評価・
//! 探索深さ・世代等の探索結果をキャッシュする。
//!
//! - probe/write はロックもフェンスも使わない（racy by design）
//! - 32バイトクラスターに10バイトエントリ3個 + 共有extraビットを詰め、
//!   probe を1キャッシュミスで済ませる
//! - 世代（generation）と深さに基づく置換ポリシー
//! - Large Pages 対応アロケータとマルチスレッドゼロクリア
//!
//! # 探索側との契約
//!
//! 読み手は千切れた書き込み（torn write）を観測しうる。返された指し手は
//! 現局面での合法性を検証してから使うこと。resize / clear は探索スレッドが
//! 停止している間にのみ呼ぶこと（`&mut self` がこれを強制する）。

pub mod threads;
pub mod tt;
pub mod types;

pub use threads::ThreadPool;
pub use tt::{ProbeResult, TTData, TranspositionTable};
pub use tt::{CLUSTER_SIZE, GENERATION_BITS, GENERATION_CYCLE, GENERATION_DELTA, GENERATION_MASK};
pub use types::{Bound, Key, Move, Value, DEPTH_ENTRY_OFFSET};
