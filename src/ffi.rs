//! Raw FFI bindings to the C shim (`csrc/ferroreq.c`).
//!
//! These are low-level unsafe functions. Use the safe wrappers in the parent module.

#![allow(non_camel_case_types)]

use std::os::raw::{c_char, c_int, c_void};

use crate::status::RawStatus;

pub type int32_t = i32;
pub type int64_t = i64;

/// Mirrors `ferroreq_status_t`.
pub type ferroreq_status_t = RawStatus;

extern "C" {
    // ============================================================
    // Environment
    // ============================================================

    pub fn ferroreq_init() -> c_int;
    pub fn ferroreq_finalize() -> c_int;
    pub fn ferroreq_initialized(flag: *mut int32_t) -> c_int;
    pub fn ferroreq_finalized(flag: *mut int32_t) -> c_int;
    pub fn ferroreq_abort(comm: int32_t, errorcode: int32_t) -> c_int;
    pub fn ferroreq_handle_kind() -> int32_t;
    pub fn ferroreq_request_null() -> int64_t;
    pub fn ferroreq_err_in_status() -> int32_t;
    pub fn ferroreq_error_string(code: int32_t, buf: *mut c_char, len: *mut int32_t) -> c_int;
    pub fn ferroreq_max_error_string() -> int32_t;
    pub fn ferroreq_max_processor_name() -> int32_t;

    // ============================================================
    // Communicators
    // ============================================================

    pub fn ferroreq_comm_rank(comm: int32_t, rank: *mut int32_t) -> c_int;
    pub fn ferroreq_comm_size(comm: int32_t, size: *mut int32_t) -> c_int;
    pub fn ferroreq_comm_set_errhandler(comm: int32_t, fatal: int32_t) -> c_int;
    pub fn ferroreq_get_processor_name(buf: *mut c_char, len: *mut int32_t) -> c_int;
    pub fn ferroreq_barrier(comm: int32_t) -> c_int;

    // ============================================================
    // Point-to-Point
    // ============================================================

    pub fn ferroreq_send(
        buf: *const c_void,
        count: int64_t,
        datatype_tag: int32_t,
        dest: int32_t,
        tag: int32_t,
        comm: int32_t,
    ) -> c_int;

    pub fn ferroreq_recv(
        buf: *mut c_void,
        count: int64_t,
        datatype_tag: int32_t,
        source: int32_t,
        tag: int32_t,
        comm: int32_t,
        status: *mut ferroreq_status_t,
    ) -> c_int;

    pub fn ferroreq_isend(
        buf: *const c_void,
        count: int64_t,
        datatype_tag: int32_t,
        dest: int32_t,
        tag: int32_t,
        comm: int32_t,
        request: *mut int64_t,
    ) -> c_int;

    pub fn ferroreq_irecv(
        buf: *mut c_void,
        count: int64_t,
        datatype_tag: int32_t,
        source: int32_t,
        tag: int32_t,
        comm: int32_t,
        request: *mut int64_t,
    ) -> c_int;

    // ============================================================
    // Single Request Completion
    // ============================================================

    pub fn ferroreq_wait(request: *mut int64_t, status: *mut ferroreq_status_t) -> c_int;
    pub fn ferroreq_test(
        request: *mut int64_t,
        flag: *mut int32_t,
        status: *mut ferroreq_status_t,
    ) -> c_int;
    pub fn ferroreq_cancel(request: *mut int64_t) -> c_int;

    // ============================================================
    // Multiple Request Completion
    // ============================================================

    pub fn ferroreq_waitany(
        count: int64_t,
        requests: *mut int64_t,
        index: *mut int32_t,
        status: *mut ferroreq_status_t,
    ) -> c_int;

    pub fn ferroreq_testany(
        count: int64_t,
        requests: *mut int64_t,
        index: *mut int32_t,
        flag: *mut int32_t,
        status: *mut ferroreq_status_t,
    ) -> c_int;

    pub fn ferroreq_waitall(
        count: int64_t,
        requests: *mut int64_t,
        statuses: *mut ferroreq_status_t,
    ) -> c_int;

    pub fn ferroreq_testall(
        count: int64_t,
        requests: *mut int64_t,
        flag: *mut int32_t,
        statuses: *mut ferroreq_status_t,
    ) -> c_int;

    pub fn ferroreq_waitsome(
        incount: int64_t,
        requests: *mut int64_t,
        outcount: *mut int32_t,
        indices: *mut int32_t,
        statuses: *mut ferroreq_status_t,
    ) -> c_int;

    pub fn ferroreq_testsome(
        incount: int64_t,
        requests: *mut int64_t,
        outcount: *mut int32_t,
        indices: *mut int32_t,
        statuses: *mut ferroreq_status_t,
    ) -> c_int;
}
