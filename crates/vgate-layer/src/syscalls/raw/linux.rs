//! Linux trap: `syscall` on x86_64, `svc #0` on aarch64. Errors come back as
//! `-errno`.

use super::{normalize_negative, RawOutcome};
use crate::descriptor::MAX_ARGS;
use std::arch::asm;

#[cfg(target_arch = "x86_64")]
#[inline(always)]
pub unsafe fn invoke(nr: usize, a: [usize; MAX_ARGS]) -> RawOutcome {
    let ret: isize;
    asm!(
        "syscall",
        inlateout("rax") nr as isize => ret,
        in("rdi") a[0],
        in("rsi") a[1],
        in("rdx") a[2],
        in("r10") a[3],
        in("r8") a[4],
        in("r9") a[5],
        lateout("rcx") _,
        lateout("r11") _,
        options(nostack)
    );
    normalize_negative(ret)
}

#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub unsafe fn invoke(nr: usize, a: [usize; MAX_ARGS]) -> RawOutcome {
    let ret: isize;
    asm!(
        "svc #0",
        in("x8") nr,
        inlateout("x0") a[0] as isize => ret,
        in("x1") a[1],
        in("x2") a[2],
        in("x3") a[3],
        in("x4") a[4],
        in("x5") a[5],
        options(nostack)
    );
    normalize_negative(ret)
}
