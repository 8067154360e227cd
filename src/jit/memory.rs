use std::ops::Index;
use std::ptr;
use std::slice::SliceIndex;

use libc::{c_void, size_t};

use crate::error::CompileError;

/// One anonymous mapping holding every compiled block. It stays
/// read-write-execute for its whole life: branch tails are rewritten in
/// place after the code has already run.
pub struct ExecutableBuffer {
    addr: *mut c_void,
    len: size_t,
}

impl ExecutableBuffer {
    pub fn allocate(size: usize) -> Result<Self, CompileError> {
        use libc::{MAP_ANON, MAP_PRIVATE, PROT_EXEC, PROT_READ, PROT_WRITE};

        let memory = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                PROT_READ | PROT_WRITE | PROT_EXEC,
                MAP_PRIVATE | MAP_ANON,
                -1,
                0,
            )
        };

        if memory == libc::MAP_FAILED {
            return Err(CompileError::ExecutableMap);
        }

        Ok(ExecutableBuffer {
            addr: memory,
            len: size,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Absolute address of the byte at `offset`.
    pub fn address_at(&self, offset: usize) -> u64 {
        self.addr as u64 + offset as u64
    }

    pub fn write(&mut self, at: usize, bytes: &[u8]) {
        assert!(
            at + bytes.len() <= self.len,
            "Encoded block at {} overruns the {} byte buffer",
            at,
            self.len
        );
        unsafe {
            ptr::copy_nonoverlapping(bytes.as_ptr(), (self.addr as *mut u8).add(at), bytes.len());
        }
    }
}

impl<I> Index<I> for ExecutableBuffer
where
    I: SliceIndex<[u8]>,
{
    type Output = I::Output;

    fn index(&self, index: I) -> &Self::Output {
        unsafe { &std::slice::from_raw_parts(self.addr as *const u8, self.len)[index] }
    }
}

impl Drop for ExecutableBuffer {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.addr, self.len);
        }
        self.addr = ptr::null_mut();
        self.len = 0;
    }
}
