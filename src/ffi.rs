//! FFI bindings for repcount
//!
//! This module provides C-compatible functions for driving a counting session
//! from a camera host written in another language. All functions use C strings
//! (null-terminated) and return allocated memory that must be freed by the
//! caller using `repcount_free_string`.

use chrono::{Local, NaiveDate};
use std::cell::RefCell;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;

use crate::config::CounterConfig;
use crate::error::RepError;
use crate::ledger::{DailyLedger, LedgerRecord};
use crate::session::{ExerciseSession, LogNotifier};
use crate::types::{zero_totals, DailyTotals, ExerciseKind, Frame};

// Thread-local storage for the last error message
thread_local! {
    static LAST_ERROR: RefCell<Option<CString>> = const { RefCell::new(None) };
}

fn set_last_error(msg: &str) {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = CString::new(msg).ok();
    });
}

fn clear_last_error() {
    LAST_ERROR.with(|e| {
        *e.borrow_mut() = None;
    });
}

/// Helper to convert C string to Rust string
unsafe fn cstr_to_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    CStr::from_ptr(ptr).to_str().ok().map(|s| s.to_string())
}

/// Helper to convert Rust string to C string (caller must free)
fn string_to_cstr(s: &str) -> *mut c_char {
    match CString::new(s) {
        Ok(cstr) => cstr.into_raw(),
        Err(_) => ptr::null_mut(),
    }
}

fn parse_tracked(csv: &str) -> Result<Vec<ExerciseKind>, RepError> {
    csv.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

fn ledger_totals_json(path: &str, date: NaiveDate) -> Result<String, RepError> {
    let totals = DailyLedger::new(path).load_totals_for(date);
    Ok(serde_json::to_string(&totals)?)
}

fn parse_prior(json: Option<String>) -> Result<DailyTotals, RepError> {
    let mut totals = zero_totals();
    if let Some(json) = json.filter(|s| !s.trim().is_empty()) {
        let loaded: DailyTotals = serde_json::from_str(&json)?;
        totals.extend(loaded);
    }
    Ok(totals)
}

// ============================================================================
// Session API
// ============================================================================

/// Opaque handle to an ExerciseSession
pub struct SessionHandle {
    session: ExerciseSession,
}

/// Start a counting session.
///
/// `config_json` may be NULL or empty for the default config. `tracked_csv`
/// lists exercise kinds (e.g. `"push_up,squat"`). `prior_json` may be NULL or
/// a JSON object of today's totals (e.g. `{"push_up": 12}`).
///
/// # Safety
/// - String arguments must be NULL (where allowed) or valid null-terminated C strings.
/// - Returns a pointer that must be freed with `repcount_session_free`.
/// - Returns NULL on error; call `repcount_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repcount_session_new(
    config_json: *const c_char,
    tracked_csv: *const c_char,
    prior_json: *const c_char,
) -> *mut SessionHandle {
    clear_last_error();

    let config = match cstr_to_string(config_json).filter(|s| !s.trim().is_empty()) {
        Some(json) => match CounterConfig::from_json(&json) {
            Ok(config) => config,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => CounterConfig::default(),
    };

    let tracked = match cstr_to_string(tracked_csv) {
        Some(csv) => match parse_tracked(&csv) {
            Ok(kinds) => kinds,
            Err(e) => {
                set_last_error(&e.to_string());
                return ptr::null_mut();
            }
        },
        None => {
            set_last_error("Invalid tracked exercises string pointer");
            return ptr::null_mut();
        }
    };

    let prior = match parse_prior(cstr_to_string(prior_json)) {
        Ok(prior) => prior,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    match ExerciseSession::start(&config, &tracked, &prior) {
        Ok(session) => Box::into_raw(Box::new(SessionHandle {
            session: session.with_notifier(LogNotifier),
        })),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Free a session without recording it.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repcount_session_new`, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn repcount_session_free(handle: *mut SessionHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Feed one frame of keypoints (a JSON `Frame`); returns a JSON array of rep events.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repcount_session_new`.
/// - `frame_json` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `repcount_free_string`.
/// - Returns NULL on error; call `repcount_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repcount_session_observe_frame(
    handle: *mut SessionHandle,
    frame_json: *const c_char,
) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &mut *handle;

    let json_str = match cstr_to_string(frame_json) {
        Some(s) => s,
        None => {
            set_last_error("Invalid frame string pointer");
            return ptr::null_mut();
        }
    };

    let frame: Frame = match serde_json::from_str(&json_str) {
        Ok(frame) => frame,
        Err(e) => {
            set_last_error(&e.to_string());
            return ptr::null_mut();
        }
    };

    let events = handle.session.observe_frame(&frame);
    match serde_json::to_string(&events) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Feed one pre-computed angle for `kind`.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repcount_session_new`.
/// - `kind` must be a valid null-terminated C string.
/// - Returns the new session count when a rep completes, 0 otherwise, and -1
///   on error (call `repcount_last_error`).
#[no_mangle]
pub unsafe extern "C" fn repcount_session_observe_angle(
    handle: *mut SessionHandle,
    kind: *const c_char,
    angle: f64,
) -> i64 {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return -1;
    }

    let handle = &mut *handle;

    let kind = match cstr_to_string(kind).map(|s| s.parse::<ExerciseKind>()) {
        Some(Ok(kind)) => kind,
        Some(Err(e)) => {
            set_last_error(&e.to_string());
            return -1;
        }
        None => {
            set_last_error("Invalid exercise string pointer");
            return -1;
        }
    };

    handle
        .session
        .observe(kind, angle)
        .map_or(0, |event| i64::from(event.session_count))
}

/// Current displayed totals as a JSON object.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repcount_session_new`.
/// - Returns a newly allocated string that must be freed with `repcount_free_string`.
/// - Returns NULL on error; call `repcount_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repcount_session_snapshot(handle: *const SessionHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = &*handle;

    match serde_json::to_string(&handle.session.snapshot()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// End the session and return its ledger line. The handle is consumed.
///
/// # Safety
/// - `handle` must be a valid pointer returned by `repcount_session_new`.
/// - After calling this function, the handle pointer is invalid.
/// - Returns a newly allocated string that must be freed with `repcount_free_string`.
/// - Returns NULL on error; call `repcount_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repcount_session_finish(handle: *mut SessionHandle) -> *mut c_char {
    clear_last_error();

    if handle.is_null() {
        set_last_error("Null session pointer");
        return ptr::null_mut();
    }

    let handle = Box::from_raw(handle);
    string_to_cstr(&handle.session.finish().to_line())
}

// ============================================================================
// Ledger API
// ============================================================================

/// Today's totals in the ledger at `path`, as a JSON object.
///
/// # Safety
/// - `path` must be a valid null-terminated C string.
/// - Returns a newly allocated string that must be freed with `repcount_free_string`.
/// - Returns NULL on error; call `repcount_last_error` to get the error message.
#[no_mangle]
pub unsafe extern "C" fn repcount_ledger_today(path: *const c_char) -> *mut c_char {
    clear_last_error();

    let path = match cstr_to_string(path) {
        Some(p) => p,
        None => {
            set_last_error("Invalid path string pointer");
            return ptr::null_mut();
        }
    };

    match ledger_totals_json(&path, Local::now().date_naive()) {
        Ok(json) => string_to_cstr(&json),
        Err(e) => {
            set_last_error(&e.to_string());
            ptr::null_mut()
        }
    }
}

/// Append a ledger line (as returned by `repcount_session_finish`).
///
/// # Safety
/// - `path` and `line` must be valid null-terminated C strings.
/// - Returns 0 on success, -1 on error (call `repcount_last_error`).
#[no_mangle]
pub unsafe extern "C" fn repcount_ledger_append_line(
    path: *const c_char,
    line: *const c_char,
) -> i32 {
    clear_last_error();

    let (path, line) = match (cstr_to_string(path), cstr_to_string(line)) {
        (Some(p), Some(l)) => (p, l),
        _ => {
            set_last_error("Invalid path or line string pointer");
            return -1;
        }
    };

    let result =
        LedgerRecord::parse_line(&line).and_then(|record| DailyLedger::new(path).append(&record));
    match result {
        Ok(()) => 0,
        Err(e) => {
            set_last_error(&e.to_string());
            -1
        }
    }
}

// ============================================================================
// Memory Management
// ============================================================================

/// Free a string returned by repcount functions.
///
/// # Safety
/// - `ptr` must be a valid pointer returned by a repcount function, or NULL.
/// - After calling this function, the pointer is invalid.
#[no_mangle]
pub unsafe extern "C" fn repcount_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        drop(CString::from_raw(ptr));
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Get the last error message.
///
/// # Safety
/// - Returns a pointer to a thread-local error string.
/// - The returned pointer is valid until the next repcount call on this thread.
/// - Do NOT free the returned pointer.
/// - Returns NULL if no error occurred.
#[no_mangle]
pub unsafe extern "C" fn repcount_last_error() -> *const c_char {
    LAST_ERROR.with(|e| match &*e.borrow() {
        Some(cstr) => cstr.as_ptr(),
        None => ptr::null(),
    })
}

/// Get the library version.
///
/// # Safety
/// - Returns a pointer to a static string. Do NOT free.
#[no_mangle]
pub unsafe extern "C" fn repcount_version() -> *const c_char {
    static VERSION: &[u8] = concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes();
    VERSION.as_ptr() as *const c_char
}
