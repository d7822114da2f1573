//! TranspositionTable本体
//!
//! - ClusterTable: 確保済みクラスター配列
//! - TranspositionTable: テーブル本体
//! - probe/write操作
//!
//! probe/write はロックもフェンスも使わない。複数スレッドの同時アクセスで
//! 千切れた書き込み（torn write）を観測しうるが、キー16bitの照合・占有判定・
//! 呼び出し側の指し手合法性検証で「最悪でも意味的なミス」に収まる設計。

use super::alloc::{AllocKind, Allocation};
use super::cluster::Cluster;
use super::entry::{TTData, TTEntry};
use super::{CLUSTER_SIZE, GENERATION_BITS, GENERATION_DELTA};
use crate::threads::ThreadPool;
use crate::types::{Bound, Key, Move, Value};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU8, Ordering};

struct ClusterTable {
    alloc: Option<Allocation>,
    len: usize,
}

impl ClusterTable {
    /// 未確保の空テーブル
    const fn empty() -> Self {
        Self { alloc: None, len: 0 }
    }

    /// len クラスター分を確保する
    ///
    /// ゼロ初期化はここでは行わない（clear が並列に行う）。
    fn new(len: usize) -> Self {
        if len == 0 {
            return Self::empty();
        }
        let bytes = len * std::mem::size_of::<Cluster>();
        let alloc = Allocation::allocate(bytes, std::mem::align_of::<Cluster>());
        Self {
            alloc: Some(alloc),
            len,
        }
    }

    fn uses_large_pages(&self) -> bool {
        self.alloc.as_ref().is_some_and(|a| a.kind() == AllocKind::LargePages)
    }
}

impl Deref for ClusterTable {
    type Target = [Cluster];

    fn deref(&self) -> &Self::Target {
        match &self.alloc {
            Some(alloc) => unsafe {
                std::slice::from_raw_parts(alloc.ptr().as_ptr() as *const Cluster, self.len)
            },
            None => &[],
        }
    }
}

impl DerefMut for ClusterTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.alloc {
            Some(alloc) => unsafe {
                std::slice::from_raw_parts_mut(alloc.ptr().as_ptr() as *mut Cluster, self.len)
            },
            None => &mut [],
        }
    }
}

/// 置換表
///
/// probe は `&self`、resize/clear は `&mut self` を取る。探索スレッドと
/// resize/clear を並行実行できないことを借用規則で表現している。
pub struct TranspositionTable {
    /// クラスターの配列
    table: ClusterTable,
    /// クラスター数
    cluster_count: usize,
    /// 世代カウンター（下位3bitは使用しない）
    generation8: AtomicU8,
}

impl TranspositionTable {
    /// 新しい置換表を作成（サイズはMB単位）
    pub fn new(mb_size: usize, threads: &ThreadPool) -> Self {
        let mut tt = Self {
            table: ClusterTable::empty(),
            cluster_count: 0,
            generation8: AtomicU8::new(0),
        };
        tt.resize(mb_size, threads);
        tt
    }

    /// サイズを変更して全エントリを破棄する
    ///
    /// 旧テーブルを先に解放してから確保する（巨大テーブルの二重常駐を避ける）。
    /// 確保後は clear で並列ゼロ初期化する。サイズの妥当性検査は呼び出し側の
    /// 責務（0やオーバーフローはここに来る前に弾く）。
    pub fn resize(&mut self, mb_size: usize, threads: &ThreadPool) {
        debug_assert!(mb_size > 0);

        self.table = ClusterTable::empty();
        self.cluster_count = mb_size * 1024 * 1024 / std::mem::size_of::<Cluster>();
        self.table = ClusterTable::new(self.cluster_count);
        self.clear(threads);

        log::info!(
            "TT resized: {} MB, {} clusters, large_pages={}",
            mb_size,
            self.cluster_count,
            self.table.uses_large_pages()
        );
    }

    /// 全エントリをゼロクリアする
    ///
    /// テーブルを threads.size() 個のストライドに分割して並列にゼロ埋めする。
    /// 末尾の端数は最後のジョブが吸収する。世代カウンターも0に戻す。
    pub fn clear(&mut self, threads: &ThreadPool) {
        self.generation8.store(0, Ordering::Relaxed);

        let len = self.table.len();
        if len == 0 {
            return;
        }

        let jobs = threads.size().min(len);
        let stride = len / jobs;
        let ptr_addr = self.table.as_mut_ptr() as usize;

        threads.fan_out(jobs, move |i| {
            let start = i * stride;
            let count = if i == jobs - 1 { len - start } else { stride };
            // SAFETY: 各ジョブは互いに素な [start, start+count) にのみ書く
            unsafe {
                let ptr = (ptr_addr as *mut Cluster).add(start);
                std::ptr::write_bytes(ptr, 0, count);
            }
        });
    }

    /// 新しい探索を開始（世代を進める）
    ///
    /// テーブル本体には触れない。古いエントリは relative_age 経由で
    /// 置換されやすくなるだけで、即座には消えない。
    pub fn new_search(&self) {
        self.generation8.fetch_add(GENERATION_DELTA, Ordering::Relaxed);
    }

    /// 現在の世代を取得
    #[inline]
    pub fn generation(&self) -> u8 {
        self.generation8.load(Ordering::Relaxed)
    }

    /// 置換表を検索
    ///
    /// キーの下位16bitが一致するエントリがあればそれを返す（占有していれば
    /// ヒット）。なければ置換価値が最小のエントリを書き込み先として選び、
    /// 既定スナップショットとともに返す。
    pub fn probe(&self, key: Key) -> ProbeResult {
        let cluster = self.cluster_for(key);
        let key16 = key as u16;

        // クラスター内を検索（下位16bitでマッチング）
        for entry in &cluster.entries {
            if entry.key16() == key16 {
                return ProbeResult {
                    found: entry.is_occupied(),
                    data: entry.read(),
                    writer: entry as *const _ as *mut _,
                };
            }
        }

        // 置換するエントリを選択（価値が最小のもの）
        let gen8 = self.generation();
        let mut replace = cluster.entries.as_ptr() as *mut TTEntry;
        let mut min_value = i32::MAX;

        for entry in &cluster.entries {
            // 置換価値 = depth8 - 2 * relative_age
            let value = entry.depth8() as i32 - 2 * entry.relative_age(gen8) as i32;

            if value < min_value {
                min_value = value;
                replace = entry as *const _ as *mut TTEntry;
            }
        }

        ProbeResult {
            found: false,
            data: TTData::EMPTY,
            writer: replace,
        }
    }

    /// 置換表の使用率を1000分率で返す
    ///
    /// 先頭1000クラスターをサンプリングし、占有かつ現世代から max_age 世代
    /// 以内のエントリを数える。サンプルは 3 × 1000 エントリで、3で割ると
    /// 1000分率になる。USI/UCI の hashfull 表示用の概算値。
    pub fn hashfull(&self, max_age: u8) -> u16 {
        let max_age_internal = (max_age as u16) << GENERATION_BITS;
        let gen8 = self.generation();
        let sample_count = 1000.min(self.cluster_count);
        let mut count = 0usize;

        for cluster in self.table.iter().take(sample_count) {
            for entry in &cluster.entries {
                if entry.is_occupied() && (entry.relative_age(gen8) as u16) <= max_age_internal {
                    count += 1;
                }
            }
        }

        (count / CLUSTER_SIZE) as u16
    }

    /// Large Pagesを使って確保されたかを返す
    pub fn uses_large_pages(&self) -> bool {
        self.table.uses_large_pages()
    }

    /// クラスター数を取得
    #[inline]
    pub fn cluster_count(&self) -> usize {
        self.cluster_count
    }

    /// クラスターインデックスを計算
    ///
    /// key * cluster_count の widening 乗算の上位64bitを取る。
    /// cluster_count が2のべき乗でなくても一様に分布し、
    /// ホットパスで除算を使わない。
    #[inline]
    fn cluster_index(&self, key: Key) -> usize {
        ((key as u128 * self.cluster_count as u128) >> 64) as usize
    }

    /// クラスターの参照を取得
    #[inline]
    fn cluster_for(&self, key: Key) -> &Cluster {
        &self.table[self.cluster_index(key)]
    }

    /// 指定キーのクラスターをプリフェッチ
    ///
    /// do_move 時に次局面のクラスターを先読みしておくと、実際の probe が
    /// キャッシュヒットしやすくなる。正しさには影響しない。
    #[inline]
    pub fn prefetch(&self, key: Key) {
        if self.cluster_count == 0 {
            return;
        }
        let cluster = self.cluster_for(key);

        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::_mm_prefetch;
            _mm_prefetch(cluster as *const _ as *const i8, 3); // _MM_HINT_T0
        }

        #[cfg(target_arch = "aarch64")]
        unsafe {
            use std::arch::aarch64::__prefetch;
            __prefetch(cluster as *const _ as *const u8);
        }

        #[cfg(all(not(target_arch = "x86_64"), not(target_arch = "aarch64")))]
        let _ = cluster; // 何もしない
    }
}

/// probe結果
pub struct ProbeResult {
    /// ヒットしたか
    pub found: bool,
    /// 読み取ったデータ（ミス時は既定スナップショット）
    pub data: TTData,
    /// 書き込み用エントリ
    writer: *mut TTEntry,
}

impl ProbeResult {
    /// エントリに書き込む
    ///
    /// 置換条件を満たさない場合、書き込みはスキップされる（失敗はしない）。
    /// 複数スレッドの writer が同一スロットで競合することがあり、読み手は
    /// フィールド単位で混ざった値を観測しうる（許容する）。
    ///
    /// # Safety
    /// writerポインタが有効であることを前提とする
    #[allow(clippy::too_many_arguments)]
    pub fn write(
        &self,
        key: Key,
        value: Value,
        is_pv: bool,
        bound: Bound,
        depth: i32,
        mv: Move,
        eval: Value,
        cut: bool,
        generation8: u8,
    ) {
        // SAFETY: writerはprobe()で取得した有効なポインタ
        unsafe {
            (*self.writer).save(key, value, is_pv, bound, depth, mv, eval, cut, generation8);
        }
    }
}
