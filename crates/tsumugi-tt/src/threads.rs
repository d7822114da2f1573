//! 置換表の初期化を分配するスレッドプール
//!
//! resize / clear のゼロクリアを複数スレッドに fan-out し、
//! 全ジョブの完了を join してから戻るだけの小さなヘルパー。
//! 探索スレッド群の管理は呼び出し側（エンジン本体）の責務で、
//! ここでは枚数とジョブ分配だけを扱う。

/// fan-out/join 型のスレッドプール
///
/// ジョブ0は呼び出し元スレッドで実行し、残りを scoped thread に割り当てる。
/// プール自体はスレッドを常駐させない。
pub struct ThreadPool {
    num_threads: usize,
}

impl ThreadPool {
    /// スレッド数を指定して作成（最低1）
    pub fn new(num_threads: usize) -> Self {
        Self {
            num_threads: num_threads.max(1),
        }
    }

    /// プールのスレッド数
    #[inline]
    pub fn size(&self) -> usize {
        self.num_threads
    }

    /// `jobs` 個のジョブを並列実行し、全て完了してから戻る
    ///
    /// 各ジョブには自分のインデックス `0..jobs` が渡される。
    /// ジョブ0は呼び出し元スレッドが実行する。
    pub fn fan_out<F>(&self, jobs: usize, job: F)
    where
        F: Fn(usize) + Sync,
    {
        if jobs <= 1 {
            if jobs == 1 {
                job(0);
            }
            return;
        }

        std::thread::scope(|scope| {
            for i in 1..jobs {
                let job = &job;
                scope.spawn(move || job(i));
            }
            job(0);
        });
        // scope がここで全ジョブを join する
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        let n = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        Self::new(n)
    }
}
