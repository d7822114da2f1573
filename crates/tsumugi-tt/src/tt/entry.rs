//! 置換表エントリー
//!
//! TTEntry: 10バイトのコンパクトなエントリ構造
//! TTData: 読み取り用のデータ構造

use super::cluster::Cluster;
use super::{GENERATION_CYCLE, GENERATION_MASK};
use crate::types::{Bound, Key, Move, Value, DEPTH_ENTRY_OFFSET};

/// 置換表エントリー
/// メモリ効率のため、フィールドを詰め込む（10バイト）
///
/// cut フラグはエントリ本体ではなく所属クラスターの extra フィールドに
/// 格納される。エントリは必ず `Cluster` 内に配置されること（read/save が
/// 自分のアドレスから所属クラスターを復元するため）。
#[derive(Clone, Copy, Default)]
#[repr(C, packed)]
pub(super) struct TTEntry {
    /// ハッシュキーの下位16bit（クラスター内の同定用）
    key16: u16,
    /// 探索深さ（DEPTH_ENTRY_OFFSETを引いた値。0は空きエントリ）
    depth8: u8,
    /// generation(5bit) | pv(1bit) | bound(2bit)
    gen_bound8: u8,
    /// 最善手（16bit形式）
    move16: u16,
    /// 探索値
    value16: i16,
    /// 評価値
    eval16: i16,
}

// エントリサイズが10バイトであることを保証
const _: () = assert!(std::mem::size_of::<TTEntry>() == 10);

impl TTEntry {
    /// 新しい空のエントリを作成
    #[inline]
    pub(super) const fn new() -> Self {
        Self {
            key16: 0,
            depth8: 0,
            gen_bound8: 0,
            move16: 0,
            value16: 0,
            eval16: 0,
        }
    }

    /// エントリが使用されているか
    #[inline]
    pub(super) fn is_occupied(&self) -> bool {
        self.depth8 != 0
    }

    /// キーの下位16bitを取得
    #[inline]
    pub(super) fn key16(&self) -> u16 {
        self.key16
    }

    /// 保存されている生のdepth8を取得
    #[inline]
    pub(super) fn depth8(&self) -> u8 {
        self.depth8
    }

    /// エントリを読み取る
    ///
    /// cut フラグは所属クラスターの extra フィールドから、アドレス復元した
    /// クラスター内インデックスで取り出す。
    pub(super) fn read(&self) -> TTData {
        // SAFETY: TTEntry は必ず Cluster 内に配置される
        let is_cut = unsafe {
            let (cluster, index) = Cluster::locate(self);
            (*cluster).cut(index)
        };

        TTData {
            mv: Move::from_u16(self.move16),
            value: Value::new(self.value16 as i32),
            eval: Value::new(self.eval16 as i32),
            depth: self.depth8 as i32 + DEPTH_ENTRY_OFFSET,
            bound: Bound::from_u8(self.gen_bound8 & 0x3).unwrap_or(Bound::None),
            is_pv: (self.gen_bound8 & 0x4) != 0,
            is_cut,
        }
    }

    /// エントリに保存
    ///
    /// # 引数が多い理由
    /// この関数は探索のホットパスで頻繁に呼ばれるため、
    /// 構造体にまとめるオーバーヘッドを避けて個別の引数として渡している。
    #[allow(clippy::too_many_arguments)]
    pub(super) fn save(
        &mut self,
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
        let key16 = key as u16;

        // 新しい手がない場合は古い手を保持
        if mv != Move::NONE || key16 != self.key16 {
            self.move16 = mv.to_u16();
        }

        // 上書き条件：
        // - BOUND_EXACT（確定値）
        // - 異なるキー
        // - より深い探索 or PVノード優先
        // - 古い世代のエントリ
        let d8 = depth - DEPTH_ENTRY_OFFSET;
        if bound == Bound::Exact
            || key16 != self.key16
            || d8 + 2 * (is_pv as i32) > self.depth8 as i32 - 4
            || self.relative_age(generation8) != 0
        {
            debug_assert!(d8 > 0 && d8 < 256);

            self.key16 = key16;
            self.depth8 = d8 as u8;
            self.gen_bound8 = generation8 | ((is_pv as u8) << 2) | bound as u8;
            self.value16 = value.raw() as i16;
            self.eval16 = eval.raw() as i16;

            // cut フラグは所属クラスターの extra に書き込む
            // SAFETY: TTEntry は必ず Cluster 内に配置される
            unsafe {
                let (cluster, index) = Cluster::locate(self);
                (*cluster).set_cut(index, cut);
            }
        } else if self.depth8 as i32 + DEPTH_ENTRY_OFFSET >= 5
            && Bound::from_u8(self.gen_bound8 & 0x3) != Some(Bound::Exact)
        {
            // 浅い置換を防ぐため、EXACT以外の深い項目はわずかに劣化させる
            self.depth8 = self.depth8.saturating_sub(1);
        }
    }

    /// 相対的な世代（0 = 最新）
    ///
    /// 8bit世代空間での巡回距離。GENERATION_CYCLE を足すことで減算が
    /// mod 256 で破綻せず、gen_bound8 の非世代ビットはマスクで消える。
    /// 戻り値は常に GENERATION_DELTA の倍数。
    #[inline]
    pub(super) fn relative_age(&self, generation8: u8) -> u8 {
        let age = GENERATION_CYCLE
            .wrapping_add(generation8 as u16)
            .wrapping_sub(self.gen_bound8 as u16);
        (age & GENERATION_MASK) as u8
    }
}

/// 置換表から読み取ったデータ
#[derive(Clone, Copy, Debug)]
pub struct TTData {
    /// 最善手
    pub mv: Move,
    /// 探索値
    pub value: Value,
    /// 評価値
    pub eval: Value,
    /// 探索深さ
    pub depth: i32,
    /// 境界タイプ
    pub bound: Bound,
    /// PVノードかどうか
    pub is_pv: bool,
    /// βカットを起こしたノードかどうか
    pub is_cut: bool,
}

impl TTData {
    /// 空のデータ（probe ミス時の既定スナップショット）
    pub const EMPTY: Self = Self {
        mv: Move::NONE,
        value: Value::NONE,
        eval: Value::NONE,
        depth: DEPTH_ENTRY_OFFSET,
        bound: Bound::None,
        is_pv: false,
        is_cut: false,
    };
}

impl Default for TTData {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::super::{CLUSTER_SIZE, GENERATION_DELTA};
    use super::*;

    // save/read はアドレスから所属クラスターを復元するため、
    // テストでも必ず Cluster 内のエントリを使う
    fn save_simple(cluster: &mut Cluster, i: usize, key: Key, depth: i32, bound: Bound, gen8: u8) {
        cluster.entries[i].save(
            key,
            Value::ZERO,
            false,
            bound,
            depth,
            Move::NONE,
            Value::ZERO,
            false,
            gen8,
        );
    }

    #[test]
    fn test_tt_entry_new() {
        let cluster = Cluster::new();
        let entry = &cluster.entries[0];
        assert!(!entry.is_occupied());
        assert_eq!(entry.key16(), 0);
    }

    #[test]
    fn test_tt_entry_save_and_read() {
        let mut cluster = Cluster::new();

        let key: Key = 0xFFFF_FFFF_FFFF_1234;
        let value = Value::new(100);
        let eval = Value::new(-50);
        let depth = 10;
        let mv = Move::from_u16(0x2B7C);
        let gen8 = 8;

        cluster.entries[0].save(key, value, true, Bound::Exact, depth, mv, eval, true, gen8);

        let entry = &cluster.entries[0];
        assert!(entry.is_occupied());
        assert_eq!(entry.key16(), 0x1234);

        let data = entry.read();
        assert_eq!(data.mv, mv);
        assert_eq!(data.value.raw(), 100);
        assert_eq!(data.eval.raw(), -50);
        assert_eq!(data.depth, 10);
        assert_eq!(data.bound, Bound::Exact);
        assert!(data.is_pv);
        assert!(data.is_cut);
    }

    #[test]
    fn test_tt_entry_roundtrip_all_indices() {
        // クラスター内の3エントリが独立に round-trip すること
        // （extra に入る cut ビットも含む）
        let mut cluster = Cluster::new();
        for i in 0..CLUSTER_SIZE {
            let key = 0x1111_0000_0000_0000 * (i as u64 + 1) + i as u64;
            let cut = i % 2 == 0;
            cluster.entries[i].save(
                key,
                Value::new(100 * i as i32),
                i == 1,
                Bound::Lower,
                5 + i as i32,
                Move::from_u16(0x1000 + i as u16),
                Value::new(-10 * i as i32),
                cut,
                GENERATION_DELTA,
            );
        }
        for i in 0..CLUSTER_SIZE {
            let data = cluster.entries[i].read();
            assert_eq!(data.value.raw(), 100 * i as i32);
            assert_eq!(data.eval.raw(), -10 * i as i32);
            assert_eq!(data.depth, 5 + i as i32);
            assert_eq!(data.mv, Move::from_u16(0x1000 + i as u16));
            assert_eq!(data.bound, Bound::Lower);
            assert_eq!(data.is_pv, i == 1);
            assert_eq!(data.is_cut, i % 2 == 0);
        }
    }

    #[test]
    fn test_tt_entry_signed_value_roundtrip() {
        let mut cluster = Cluster::new();
        for (i, raw) in [i16::MIN, -1, 0, 1, i16::MAX].into_iter().enumerate() {
            cluster.entries[0].save(
                i as u64,
                Value::new(raw as i32),
                false,
                Bound::Exact,
                10,
                Move::NONE,
                Value::new(raw as i32),
                false,
                0,
            );
            let data = cluster.entries[0].read();
            assert_eq!(data.value.raw(), raw as i32);
            assert_eq!(data.eval.raw(), raw as i32);
        }
    }

    #[test]
    fn test_tt_entry_depth_bounds() {
        let mut cluster = Cluster::new();

        // 格納可能な最小の深さ
        save_simple(&mut cluster, 0, 1, DEPTH_ENTRY_OFFSET + 1, Bound::Lower, 0);
        assert!(cluster.entries[0].is_occupied());
        assert_eq!(cluster.entries[0].read().depth, DEPTH_ENTRY_OFFSET + 1);

        // 格納可能な最大の深さ
        save_simple(&mut cluster, 1, 2, DEPTH_ENTRY_OFFSET + 255, Bound::Exact, 0);
        assert_eq!(cluster.entries[1].read().depth, DEPTH_ENTRY_OFFSET + 255);
    }

    #[test]
    fn test_tt_entry_relative_age() {
        let mut cluster = Cluster::new();
        save_simple(&mut cluster, 0, 0, 10, Bound::Lower, 8);

        let entry = &cluster.entries[0];
        // 同じ世代では0
        assert_eq!(entry.relative_age(8), 0);
        // 世代が進むと8刻みでageが増える（GENERATION_DELTA = 8）
        assert_eq!(entry.relative_age(16), 8);
        // ラップしても GENERATION_DELTA の倍数かつ 256 未満
        let mut gen8 = 8u8;
        for _ in 0..40 {
            gen8 = gen8.wrapping_add(GENERATION_DELTA);
            let age = entry.relative_age(gen8);
            assert_eq!(age % GENERATION_DELTA, 0);
        }
    }

    #[test]
    fn test_tt_entry_move_preservation() {
        let mut cluster = Cluster::new();
        let key: Key = 0x5A5A;

        cluster.entries[0].save(
            key,
            Value::new(10),
            false,
            Bound::Lower,
            10,
            Move::from_u16(0xABCD),
            Value::ZERO,
            false,
            0,
        );

        // 同一キーで move なし、深さ+2 の上書き → 指し手は保持、他は更新
        cluster.entries[0].save(
            key,
            Value::new(77),
            false,
            Bound::Lower,
            12,
            Move::NONE,
            Value::ZERO,
            false,
            0,
        );

        let data = cluster.entries[0].read();
        assert_eq!(data.mv, Move::from_u16(0xABCD));
        assert_eq!(data.value.raw(), 77);
        assert_eq!(data.depth, 12);

        // キーが変われば move なしでも上書きされる
        cluster.entries[0].save(
            key ^ 0xFFFF,
            Value::new(1),
            false,
            Bound::Lower,
            10,
            Move::NONE,
            Value::ZERO,
            false,
            0,
        );
        assert_eq!(cluster.entries[0].read().mv, Move::NONE);
    }

    #[test]
    fn test_tt_entry_exact_forces_overwrite() {
        let mut cluster = Cluster::new();
        let key: Key = 0x77;

        // 深い UPPER を格納
        save_simple(&mut cluster, 0, key, DEPTH_ENTRY_OFFSET + 100, Bound::Upper, 0);
        // 同一キー・浅い EXACT でも上書きされる
        save_simple(&mut cluster, 0, key, DEPTH_ENTRY_OFFSET + 10, Bound::Exact, 0);

        let data = cluster.entries[0].read();
        assert_eq!(data.depth, DEPTH_ENTRY_OFFSET + 10);
        assert_eq!(data.bound, Bound::Exact);
    }

    #[test]
    fn test_tt_entry_decay_non_exact() {
        let mut cluster = Cluster::new();
        let key: Key = 0x1234;

        // 深いLower境界を保存
        save_simple(&mut cluster, 0, key, 8, Bound::Lower, 0);
        let depth_before = cluster.entries[0].depth8();

        // 同一世代・同一キー・浅いLowerはスキップされ、深さが1減衰する
        save_simple(&mut cluster, 0, key, 1, Bound::Lower, 0);
        assert_eq!(cluster.entries[0].depth8(), depth_before - 1);
    }

    #[test]
    fn test_tt_entry_decay_still_updates_move() {
        // 指し手の差し替えは上書き判定の外にあるため、本体が減衰経路に
        // 入った保存でも新しい指し手だけは反映される
        let mut cluster = Cluster::new();
        let key: Key = 0x0C0C;

        cluster.entries[0].save(
            key,
            Value::new(30),
            false,
            Bound::Lower,
            8,
            Move::from_u16(0x1111),
            Value::new(5),
            false,
            0,
        );
        let depth_before = cluster.entries[0].depth8();

        cluster.entries[0].save(
            key,
            Value::new(-99),
            false,
            Bound::Upper,
            1,
            Move::from_u16(0x7777),
            Value::new(-5),
            false,
            0,
        );

        let data = cluster.entries[0].read();
        // 指し手は新しいものに置き換わる
        assert_eq!(data.mv, Move::from_u16(0x7777));
        // 本体はスキップされ、深さは1減衰する
        assert_eq!(cluster.entries[0].depth8(), depth_before - 1);
        assert_eq!(data.value.raw(), 30);
        assert_eq!(data.eval.raw(), 5);
        assert_eq!(data.bound, Bound::Lower);
    }

    #[test]
    fn test_tt_entry_identical_resave_is_noop() {
        let mut cluster = Cluster::new();
        let key: Key = 0xBEEF;

        cluster.entries[0].save(
            key,
            Value::new(42),
            false,
            Bound::Lower,
            10,
            Move::from_u16(0x0101),
            Value::new(7),
            false,
            8,
        );
        let before = cluster.entries[0].read();

        // 同一キー・同一深さ・move なしの再保存で内容が変わらないこと
        cluster.entries[0].save(
            key,
            Value::new(42),
            false,
            Bound::Lower,
            10,
            Move::NONE,
            Value::new(7),
            false,
            8,
        );
        let after = cluster.entries[0].read();

        assert_eq!(after.mv, before.mv);
        assert_eq!(after.value, before.value);
        assert_eq!(after.eval, before.eval);
        assert_eq!(after.depth, before.depth);
        assert_eq!(after.bound, before.bound);
        assert_eq!(after.is_pv, before.is_pv);
    }

    #[test]
    fn test_tt_data_empty() {
        let data = TTData::EMPTY;
        assert_eq!(data.mv, Move::NONE);
        assert_eq!(data.value, Value::NONE);
        assert_eq!(data.eval, Value::NONE);
        assert_eq!(data.depth, DEPTH_ENTRY_OFFSET);
        assert_eq!(data.bound, Bound::None);
        assert!(!data.is_pv);
        assert!(!data.is_cut);
    }
}
