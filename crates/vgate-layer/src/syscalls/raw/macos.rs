//! Darwin trap: `svc #0x80` on arm64, `syscall` with the BSD class prefix on
//! x86_64. The carry flag marks failure and the result register then holds
//! errno. The kernel also writes a secondary result (x1 / rdx).
//!
//! Syscall numbers: `/usr/include/sys/syscall.h`.

use super::{normalize_carry, RawOutcome};
use crate::descriptor::MAX_ARGS;
use std::arch::asm;

#[cfg(target_arch = "aarch64")]
#[inline(never)]
pub unsafe fn invoke(nr: usize, a: [usize; MAX_ARGS]) -> RawOutcome {
    let ret: isize;
    let carry: usize;
    asm!(
        "svc #0x80",
        "cset {carry}, cs",
        in("x16") nr,
        inlateout("x0") a[0] as isize => ret,
        inlateout("x1") a[1] => _,
        in("x2") a[2],
        in("x3") a[3],
        in("x4") a[4],
        in("x5") a[5],
        carry = lateout(reg) carry,
        options(nostack)
    );
    normalize_carry(carry != 0, ret)
}

/// BSD syscall class on x86_64.
#[cfg(target_arch = "x86_64")]
const SYSCALL_CLASS_UNIX: usize = 0x200_0000;

#[cfg(target_arch = "x86_64")]
#[inline(never)]
pub unsafe fn invoke(nr: usize, a: [usize; MAX_ARGS]) -> RawOutcome {
    let ret: isize;
    let carry: u8;
    asm!(
        "syscall",
        "setc {carry}",
        inlateout("rax") (SYSCALL_CLASS_UNIX | nr) as isize => ret,
        in("rdi") a[0],
        in("rsi") a[1],
        inlateout("rdx") a[2] => _,
        in("r10") a[3],
        in("r8") a[4],
        in("r9") a[5],
        lateout("rcx") _,
        lateout("r11") _,
        carry = lateout(reg_byte) carry,
        options(nostack)
    );
    normalize_carry(carry != 0, ret)
}
