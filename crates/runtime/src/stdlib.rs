//! Bundled `std` host library.
//!
//! Installed by full state construction. Currently a single entry:
//! `require(library [, version])`, which lets a script assert that a host
//! library table is present in the global namespace (optionally at an exact
//! marker version) before it goes on to use it.

use core::ffi::c_int;

use lunet_sys as ffi;

use crate::callback::FunctionArgs;
use crate::error::{Error, Result};
use crate::library::{Library, LibraryDescriptor};
use crate::state::Interp;
use crate::value::Value;

pub(crate) fn install(interp: &Interp) -> Result<()> {
    let descriptor = LibraryDescriptor::new("1.0.0")?;
    let library = Library::new("std", descriptor).method("require", std_require);
    interp.load_library(&library)
}

/// `require(library [, version])`: raises a script error when the named
/// library is not installed, or when its `__version` entry differs from the
/// requested one.
unsafe extern "C" fn std_require(raw: *mut ffi::lua_State) -> c_int {
    let message = match check_require(raw) {
        Ok(()) => return 0,
        Err(e) => e.to_string(),
    };
    // All owned values are dropped before the jump out of this frame.
    unsafe { raise(raw, message) }
}

fn check_require(raw: *mut ffi::lua_State) -> Result<()> {
    let args = unsafe { FunctionArgs::new(raw) }?;
    if args.is_empty() || args.len() > 2 {
        return Err(Error::Argument("invalid arguments for require()".into()));
    }
    let Value::Str(library) = args.get(0)? else {
        return Err(Error::Argument("require() expects a library name".into()));
    };
    let wanted = match args.len() {
        2 => match args.get(1)? {
            Value::Str(version) => Some(version.clone()),
            _ => {
                return Err(Error::Argument(
                    "require() expects the version as a string".into(),
                ));
            }
        },
        _ => None,
    };

    let tables = args.state().tables();
    let resolved = tables.global().get_value(library.as_str())?;
    let Value::Table(reference) = resolved else {
        return Err(Error::Runtime(format!(
            "script requires the module {library}"
        )));
    };
    if let Some(wanted) = wanted {
        let installed = tables.from_ref(reference)?.pop("__version")?;
        if installed.as_str() != Some(wanted.as_str()) {
            let installed = installed.as_str().unwrap_or("(unknown)").to_owned();
            return Err(Error::Runtime(format!(
                "script requires the module {library} with version {wanted} \
                 but version {installed} is installed"
            )));
        }
    }
    Ok(())
}

/// Pushes `message` and raises it as a script error. The engine unwinds the
/// surrounding protected call; this function does not return.
unsafe fn raise(raw: *mut ffi::lua_State, message: String) -> c_int {
    unsafe { ffi::lua_pushlstring(raw, message.as_ptr().cast(), message.len()) };
    drop(message);
    unsafe { ffi::lua_error(raw) }
}
