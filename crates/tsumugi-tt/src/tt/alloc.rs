//! 置換表用のメモリ確保
//!
//! テーブルは数GBになりうるため、TLBミスを減らす目的で可能なら
//! Large Pages (Huge Pages) 上に確保する。
//!
//! - Linux/Android: 2MiB 境界に整列した通常確保 + `madvise(MADV_HUGEPAGE)`
//! - Windows: `SeLockMemoryPrivilege` を一時昇格して `MEM_LARGE_PAGES` で確保
//! - それ以外: 通常ページ
//!
//! どの経路でも確保に失敗したら stderr に診断を出して終了する。
//! 置換表なしの探索に意味はないので、縮小リトライはしない。

use std::ptr::NonNull;

#[cfg(not(windows))]
use std::alloc::{alloc, dealloc, Layout};

#[cfg(windows)]
use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_SUCCESS, HANDLE};
#[cfg(windows)]
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, LookupPrivilegeValueA, OpenProcessToken, LUID_AND_ATTRIBUTES,
    SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES, TOKEN_PRIVILEGES, TOKEN_QUERY,
};
#[cfg(windows)]
use windows_sys::Win32::System::Memory::{
    GetLargePageMinimum, VirtualAlloc, VirtualFree, MEM_COMMIT, MEM_LARGE_PAGES, MEM_RELEASE,
    MEM_RESERVE, PAGE_READWRITE,
};
#[cfg(windows)]
use windows_sys::Win32::System::Threading::GetCurrentProcess;

/// 確保がどの種類のページに載ったか
///
/// `uses_large_pages` の報告用。確保後の扱いはどちらも同じ。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum AllocKind {
    LargePages,
    /// Large Pages が使えなかったときの通常ページ
    Regular,
}

/// 置換表1枚分の生メモリ
///
/// Drop で OS に返却する。内容の初期化は行わない（clear の責務）。
pub(super) struct Allocation {
    ptr: NonNull<u8>,
    kind: AllocKind,
    #[cfg(not(windows))]
    layout: Layout,
}

impl Allocation {
    /// size バイトを alignment 以上に整列して確保する
    ///
    /// 戻ってきたら必ず有効なポインタを持つ。確保できない場合は戻らない。
    pub(super) fn allocate(size: usize, alignment: usize) -> Self {
        #[cfg(windows)]
        {
            alloc_windows(size)
        }

        #[cfg(not(windows))]
        {
            alloc_unix(size, alignment)
        }
    }

    pub(super) fn ptr(&self) -> NonNull<u8> {
        self.ptr
    }

    pub(super) fn kind(&self) -> AllocKind {
        self.kind
    }
}

impl Drop for Allocation {
    fn drop(&mut self) {
        unsafe {
            #[cfg(windows)]
            {
                // MEM_RELEASE はサイズ0指定で予約全体を返す
                if VirtualFree(self.ptr.as_ptr() as *mut _, 0, MEM_RELEASE) == 0 {
                    eprintln!("Warning: VirtualFree failed with error {}", GetLastError());
                    debug_assert!(false, "VirtualFree failed");
                }
            }
            #[cfg(not(windows))]
            {
                dealloc(self.ptr.as_ptr(), self.layout);
            }
        }
    }
}

// SAFETY: Allocation は置換表の生メモリを単独所有し、
// 並行アクセスの規律は上位（TranspositionTable）が持つ
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

/// 確保失敗時の致命的エラー処理
fn alloc_failure(bytes: usize) -> ! {
    eprintln!("Failed to allocate {bytes} bytes for the transposition table");
    std::process::exit(1);
}

#[cfg(not(windows))]
fn alloc_unix(size: usize, alignment: usize) -> Allocation {
    // Linux では整列が 2MiB 境界に載っていないと THP が適用されないため、
    // 要求整列をページサイズまで引き上げる
    let huge = cfg!(any(target_os = "linux", target_os = "android"));
    let page_align = if huge { 2 * 1024 * 1024 } else { 4096 };
    let kind = if huge { AllocKind::LargePages } else { AllocKind::Regular };

    let layout = match Layout::from_size_align(size, alignment.max(page_align)) {
        Ok(layout) => layout.pad_to_align(),
        Err(_) => alloc_failure(size),
    };
    let ptr = unsafe { alloc(layout) };
    if ptr.is_null() {
        alloc_failure(layout.size());
    }

    request_huge_pages(ptr, layout.size());

    Allocation {
        // null チェック済み
        ptr: unsafe { NonNull::new_unchecked(ptr) },
        kind,
        layout,
    }
}

/// カーネルに Transparent Huge Pages の適用を要求する
///
/// madvise はあくまで助言で、失敗しても確保自体は有効。
/// 性能にだけ効くので警告を残して続行する。
#[cfg(any(target_os = "linux", target_os = "android"))]
fn request_huge_pages(ptr: *mut u8, len: usize) {
    let rc = unsafe { libc::madvise(ptr as *mut _, len, libc::MADV_HUGEPAGE) };
    if rc != 0 {
        log::warn!("madvise(MADV_HUGEPAGE) failed for TT allocation");
    }
}

#[cfg(all(not(windows), not(any(target_os = "linux", target_os = "android"))))]
fn request_huge_pages(_ptr: *mut u8, _len: usize) {}

/// Large Pages → 通常ページの順で確保する（Windows）
#[cfg(windows)]
fn alloc_windows(size: usize) -> Allocation {
    if let Some(alloc) = try_large_pages(size) {
        return alloc;
    }

    let ptr = unsafe {
        VirtualAlloc(std::ptr::null_mut(), size, MEM_RESERVE | MEM_COMMIT, PAGE_READWRITE)
    };
    match NonNull::new(ptr as *mut u8) {
        Some(ptr) => Allocation {
            ptr,
            kind: AllocKind::Regular,
        },
        None => alloc_failure(size),
    }
}

/// Large Pages での確保を試みる（Windows）
///
/// 特権の昇格・確保のどこで失敗しても None を返し、通常ページに
/// フォールバックさせる。
#[cfg(windows)]
fn try_large_pages(size: usize) -> Option<Allocation> {
    let min_page = unsafe { GetLargePageMinimum() } as usize;
    if min_page == 0 {
        // OS側が Large Pages 未対応
        return None;
    }

    let _privilege = LockMemoryPrivilege::enable()?;

    // MEM_LARGE_PAGES の確保サイズはページ境界への切り上げが必須
    let rounded = size.div_ceil(min_page).checked_mul(min_page)?;
    let ptr = unsafe {
        VirtualAlloc(
            std::ptr::null_mut(),
            rounded,
            MEM_RESERVE | MEM_COMMIT | MEM_LARGE_PAGES,
            PAGE_READWRITE,
        )
    };

    // ここで _privilege が drop され、特権状態が元に戻る
    Some(Allocation {
        ptr: NonNull::new(ptr as *mut u8)?,
        kind: AllocKind::LargePages,
    })
}

/// `SeLockMemoryPrivilege` を一時的に有効化するガード
///
/// Large Pages の確保にはこの特権が必要。確保が済んだら drop で
/// 昇格前の特権状態に戻し、プロセストークンを閉じる。
#[cfg(windows)]
struct LockMemoryPrivilege {
    token: HANDLE,
    previous: TOKEN_PRIVILEGES,
}

#[cfg(windows)]
impl LockMemoryPrivilege {
    fn enable() -> Option<Self> {
        unsafe {
            let mut token = std::mem::zeroed();
            if OpenProcessToken(
                GetCurrentProcess(),
                TOKEN_ADJUST_PRIVILEGES | TOKEN_QUERY,
                &mut token,
            ) == 0
            {
                return None;
            }

            let mut luid = std::mem::zeroed();
            if LookupPrivilegeValueA(
                std::ptr::null(),
                b"SeLockMemoryPrivilege\0".as_ptr() as *const i8,
                &mut luid,
            ) == 0
            {
                CloseHandle(token);
                return None;
            }

            let mut wanted = TOKEN_PRIVILEGES {
                PrivilegeCount: 1,
                Privileges: [LUID_AND_ATTRIBUTES {
                    Luid: luid,
                    Attributes: SE_PRIVILEGE_ENABLED,
                }],
            };
            let mut previous = std::mem::zeroed::<TOKEN_PRIVILEGES>();
            let mut previous_len = std::mem::size_of::<TOKEN_PRIVILEGES>() as u32;

            // 戻り値が非ゼロでも部分適用（ERROR_NOT_ALL_ASSIGNED）の可能性が
            // あるため、GetLastError まで見て成功を判定する
            let granted = AdjustTokenPrivileges(
                token,
                0,
                &mut wanted,
                previous_len,
                &mut previous,
                &mut previous_len,
            ) != 0
                && GetLastError() == ERROR_SUCCESS;

            if !granted {
                CloseHandle(token);
                return None;
            }

            Some(Self { token, previous })
        }
    }
}

#[cfg(windows)]
impl Drop for LockMemoryPrivilege {
    fn drop(&mut self) {
        unsafe {
            AdjustTokenPrivileges(
                self.token,
                0,
                &mut self.previous,
                0,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            );
            CloseHandle(self.token);
        }
    }
}
