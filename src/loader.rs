// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Plugin materialization and symbol resolution from an in-memory image.
// Ported from the memfd_create + dynamic-loader technique this router's
// app loader uses to avoid ever touching the filesystem with a plugin's
// bytes, generalized here to an explicit `PluginLoader` trait so the
// mechanism stays an implementation detail behind `load`/`resolve`/`close`.

use std::ffi::CString;
use std::os::raw::c_void;

use crate::error::{Result, RouterError};

/// Opaque handle to a loaded plugin image.
pub struct PluginHandle {
    #[cfg(unix)]
    lib: *mut c_void,
    name: String,
}

unsafe impl Send for PluginHandle {}

/// Abstracts plugin load/resolve/close; the underlying mechanism (anonymous
/// file + dynamic loader) is an implementation detail of the default impl.
pub trait PluginLoader: Send + Sync {
    fn load(&self, name: &str, image: &[u8]) -> Result<PluginHandle>;
    fn resolve(&self, handle: &PluginHandle, symbol: &str) -> Result<*const ()>;
    fn close(&self, handle: PluginHandle) -> Result<()>;
}

/// Default loader: materializes the image as an anonymous in-memory file
/// (Linux: `memfd_create`; other unix: a temp file unlinked immediately
/// after `dlopen`) and dlopen-equivalents it.
pub struct DefaultLoader;

impl PluginLoader for DefaultLoader {
    #[cfg(target_os = "linux")]
    fn load(&self, name: &str, image: &[u8]) -> Result<PluginHandle> {
        unsafe {
            let fd_name = CString::new("jrtc_app").unwrap();
            let fd = libc::syscall(libc::SYS_memfd_create, fd_name.as_ptr(), 0u32) as i32;
            if fd < 0 {
                return Err(RouterError::PluginLoad { reason: "memfd_create failed".into() });
            }
            let written = libc::write(fd, image.as_ptr() as *const c_void, image.len());
            if written < 0 || written as usize != image.len() {
                libc::close(fd);
                return Err(RouterError::PluginLoad { reason: "failed writing plugin image".into() });
            }
            let path = format!("/proc/self/fd/{fd}\0");
            let lib = libc::dlopen(path.as_ptr() as *const i8, libc::RTLD_NOW);
            libc::close(fd);
            if lib.is_null() {
                return Err(RouterError::PluginLoad { reason: dlerror_string() });
            }
            Ok(PluginHandle { lib, name: name.to_owned() })
        }
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    fn load(&self, name: &str, image: &[u8]) -> Result<PluginHandle> {
        use std::io::Write;
        let path = std::env::temp_dir().join(format!("jrtc_app_{}_{}", std::process::id(), name));
        {
            let mut f = std::fs::File::create(&path)?;
            f.write_all(image)?;
        }
        let c_path = CString::new(path.to_string_lossy().into_owned()).unwrap();
        let lib = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW) };
        let _ = std::fs::remove_file(&path);
        if lib.is_null() {
            return Err(RouterError::PluginLoad { reason: unsafe { dlerror_string() } });
        }
        Ok(PluginHandle { lib, name: name.to_owned() })
    }

    #[cfg(not(unix))]
    fn load(&self, _name: &str, _image: &[u8]) -> Result<PluginHandle> {
        Err(RouterError::PluginLoad { reason: "plugin loading requires unix".into() })
    }

    #[cfg(unix)]
    fn resolve(&self, handle: &PluginHandle, symbol: &str) -> Result<*const ()> {
        let c_sym = CString::new(symbol).unwrap();
        let ptr = unsafe { libc::dlsym(handle.lib, c_sym.as_ptr()) };
        if ptr.is_null() {
            return Err(RouterError::PluginLoad {
                reason: format!("symbol `{symbol}` not found in plugin `{}`", handle.name),
            });
        }
        Ok(ptr as *const ())
    }

    #[cfg(not(unix))]
    fn resolve(&self, _handle: &PluginHandle, _symbol: &str) -> Result<*const ()> {
        Err(RouterError::PluginLoad { reason: "plugin loading requires unix".into() })
    }

    #[cfg(unix)]
    fn close(&self, handle: PluginHandle) -> Result<()> {
        let rc = unsafe { libc::dlclose(handle.lib) };
        if rc != 0 {
            return Err(RouterError::Fatal { reason: format!("dlclose failed for plugin `{}`", handle.name) });
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn close(&self, _handle: PluginHandle) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
unsafe fn dlerror_string() -> String {
    let ptr = libc::dlerror();
    if ptr.is_null() {
        "unknown dlopen error".to_owned()
    } else {
        std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loading_garbage_bytes_fails_cleanly() {
        let loader = DefaultLoader;
        let result = loader.load("bogus", b"not an elf shared object");
        assert!(result.is_err());
    }
}
