//! Stack pivoting for 32-bit callees
//!
//! Guest code addresses its stack through `%esp`, so the first push on a
//! stack above 2^32 would fault. [`stack_jump`] runs a callback on a
//! freshly mapped low-memory stack; [`enter32_i`] performs the actual
//! 64-to-32 transfer and must only be used from such a stack.

use std::ffi::c_void;

use crate::{error::Result, shim};

/// Invoke `f(param)` on a freshly mapped low-memory stack of
/// `stack_size` bytes
///
/// The host stack pointer is swapped for the duration of the call and
/// restored before the stack is released. The pivot is thread-local;
/// re-entering from inside the callback is not supported.
pub fn stack_jump(
    stack_size: usize,
    f: extern "C" fn(*mut c_void),
    param: *mut c_void,
) -> Result<()> {
    let stack = crate::mem::LowRegion::map(
        stack_size,
        crate::mem::Prot::READ | crate::mem::Prot::WRITE,
    )?;
    let top = unsafe { stack.base().add(stack.len()) };
    // The inputs are pinned to callee-saved registers so the callback
    // cannot clobber them, and the old stack pointer is kept in r15
    // across the call
    unsafe {
        core::arch::asm!(
            "movq %rsp, %r15",
            "movq %r12, %rsp",
            "pushq %r15",
            "pushq %r15",
            "movq %r14, %rdi",
            "callq *%r13",
            "popq %r15",
            "popq %rsp",
            in("r12") top,
            in("r13") f,
            in("r14") param,
            out("r15") _,
            clobber_abi("C"),
            options(att_syntax),
        );
    }
    Ok(())
}

/// Call the 32-bit code at `entry` with a single integer argument and
/// return its result
///
/// The transfer goes through the process-wide entry thunk: a far call into
/// the compatibility code segment, a cdecl-shaped argument push, a near
/// call to `entry`, and a far return.
///
/// # Safety
///
/// `entry` must be the address of 32-bit code taking one integer argument
/// on the stack, such as an address returned by a loader or the shim
/// table. The current stack must lie below 2^32, which in practice means
/// calling from inside a [`stack_jump`] callback.
pub unsafe fn enter32_i(entry: u32, arg: i32) -> Result<i32> {
    let thunk = shim::shims()?.enter32();
    let thunk: unsafe extern "C" fn(u32, i32) -> i32 =
        unsafe { std::mem::transmute(thunk as usize as *const ()) };
    Ok(unsafe { thunk(entry, arg) })
}
