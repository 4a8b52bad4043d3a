#![allow(clippy::missing_safety_doc)]

use std::borrow::Cow;
use std::ptr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use formfill_core::{Lexicon, MappingCfg, MappingEngine};
use formfill_supervisor::{
    build_entity_batch, fields_from_slots, BasicEntityBuilder, Choice, DetectedSlot, ExtractionRecord,
    ReportedOutcome, SessionError, SessionId, SessionRequest, SessionSupervisor, SupervisorSnapshot,
};

/// FFI ABI version for formfill_ffi.
///
/// Bump this when any `#[repr(C)]` struct layout, exported function signature,
/// or JSON payload shape changes.
pub const FORMFILL_FFI_VERSION: u32 = 1;

#[no_mangle]
pub extern "C" fn formfill_ffi_version() -> u32 {
    FORMFILL_FFI_VERSION
}

// Snapshot wire format identification.
const SNAP_MAGIC: u32 = 0x3153_4646; // "FFS1" little-endian
const SNAP_VERSION: u32 = 1;

// Return codes.
pub const FF_OK: i32 = 0;
pub const FF_ERR_ARG: i32 = -1;
pub const FF_ERR_PAYLOAD: i32 = -2;
pub const FF_ERR_UNKNOWN_SESSION: i32 = -3;
pub const FF_ERR_SCHEMA: i32 = -4;
pub const FF_ERR_TRANSITION: i32 = -5;
pub const FF_ERR_REQUEST: i32 = -6;
pub const FF_ERR_SNAP_MAGIC: i32 = -8;
pub const FF_ERR_SNAP_VERSION: i32 = -9;

/// Opaque handle exposed over FFI.
pub struct FfSupervisor {
    inner: SessionSupervisor,
    builder: BasicEntityBuilder,
}

/// FFI string view (UTF-8 bytes).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfStr {
    pub ptr: *const u8,
    pub len: usize,
}

impl FfStr {
    fn as_str(&self) -> Option<&str> {
        if self.ptr.is_null() {
            return None;
        }
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr, self.len) };
        std::str::from_utf8(bytes).ok()
    }
}

/// Owned byte buffer. Free with `formfill_bytes_free`.
#[repr(C)]
pub struct FfBytes {
    pub ptr: *mut u8,
    pub len: usize,
}

impl FfBytes {
    fn empty() -> Self {
        FfBytes { ptr: ptr::null_mut(), len: 0 }
    }

    fn from_vec(buf: Vec<u8>) -> Self {
        let mut boxed = buf.into_boxed_slice();
        let ptr = boxed.as_mut_ptr();
        let len = boxed.len();
        std::mem::forget(boxed);
        FfBytes { ptr, len }
    }
}

/// Result of a session call: a return code and a JSON body.
///
/// On success the body is the operation's JSON output; on failure it is
/// `{"error": "..."}`. The body must be freed with `formfill_bytes_free`.
#[repr(C)]
pub struct FfResult {
    pub rc: i32,
    pub body: FfBytes,
}

/// Restore result statistics (FFI-safe).
#[repr(C)]
pub struct FfRestoreStats {
    pub applied: u32,
    pub overwritten: u32,
    pub rc: i32,
}

/// Mapping thresholds for FFI (the credits keep their defaults).
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfCfg {
    pub w_type: f32,
    pub w_label: f32,
    pub w_context: f32,
    pub confident: f32,
    pub ambiguity_margin: f32,
    pub min_consider: f32,
    pub low_confidence: f32,
    pub block_on_invalid: u8,
}

#[no_mangle]
pub extern "C" fn formfill_cfg_default() -> FfCfg {
    let d = MappingCfg::default();
    FfCfg {
        w_type: d.w_type,
        w_label: d.w_label,
        w_context: d.w_context,
        confident: d.confident,
        ambiguity_margin: d.ambiguity_margin,
        min_consider: d.min_consider,
        low_confidence: d.low_confidence,
        block_on_invalid: if d.block_on_invalid { 1 } else { 0 },
    }
}

fn cfg_from_ffi(c: FfCfg) -> MappingCfg {
    MappingCfg {
        w_type: c.w_type,
        w_label: c.w_label,
        w_context: c.w_context,
        confident: c.confident,
        ambiguity_margin: c.ambiguity_margin,
        min_consider: c.min_consider,
        low_confidence: c.low_confidence,
        block_on_invalid: c.block_on_invalid != 0,
        ..MappingCfg::default()
    }
}

fn rc_of(e: &SessionError) -> i32 {
    match e {
        SessionError::UnknownSession(_) => FF_ERR_UNKNOWN_SESSION,
        SessionError::Schema(_) => FF_ERR_SCHEMA,
        SessionError::InvalidTransition { .. } => FF_ERR_TRANSITION,
        SessionError::UnknownField(_)
        | SessionError::UnknownClarification(_)
        | SessionError::InvalidChoice { .. }
        | SessionError::EntityAlreadyAssigned { .. } => FF_ERR_REQUEST,
    }
}

fn error_result(rc: i32, msg: impl std::fmt::Display) -> FfResult {
    let body = serde_json::json!({ "error": msg.to_string() });
    FfResult {
        rc,
        body: FfBytes::from_vec(body.to_string().into_bytes()),
    }
}

fn json_result<T: Serialize>(r: Result<T, SessionError>) -> FfResult {
    match r {
        Ok(v) => match serde_json::to_vec(&v) {
            Ok(buf) => FfResult {
                rc: FF_OK,
                body: FfBytes::from_vec(buf),
            },
            Err(e) => error_result(FF_ERR_PAYLOAD, e),
        },
        Err(e) => error_result(rc_of(&e), e),
    }
}

fn session_id(s: FfStr) -> Result<SessionId, FfResult> {
    let text = s.as_str().ok_or_else(|| error_result(FF_ERR_ARG, "session id is not UTF-8"))?;
    Uuid::parse_str(text).map_err(|e| error_result(FF_ERR_ARG, e))
}

/// `formfill_start_session` request body.
#[derive(Deserialize)]
struct StartRequest<'a> {
    #[serde(default)]
    entities: Vec<ExtractionRecord<'a>>,
    fields: Vec<DetectedSlot<'a>>,
    #[serde(default)]
    reference_date: Option<NaiveDate>,
    #[serde(default)]
    template: Option<Cow<'a, str>>,
}

#[derive(Serialize)]
struct Started {
    session_id: SessionId,
}

/// Create a new supervisor handle. Returns null when `cfg` fails validation.
///
/// This library does not spawn threads. Concurrent calls on one handle
/// serialize per shard via internal mutexes.
#[no_mangle]
pub extern "C" fn formfill_supervisor_new(shards: usize, cfg: FfCfg) -> *mut FfSupervisor {
    let cfg = cfg_from_ffi(cfg);
    if cfg.validate().is_err() {
        return ptr::null_mut();
    }
    let handle = FfSupervisor {
        inner: SessionSupervisor::new(shards.max(1), MappingEngine::new(cfg, Lexicon::default_en())),
        builder: BasicEntityBuilder::default(),
    };
    Box::into_raw(Box::new(handle))
}

#[no_mangle]
pub unsafe extern "C" fn formfill_supervisor_free(h: *mut FfSupervisor) {
    if !h.is_null() {
        drop(Box::from_raw(h));
    }
}

/// Start a session from a JSON request:
/// `{"entities": [...], "fields": [...], "reference_date": "YYYY-MM-DD", "template": null}`.
/// Body on success: `{"session_id": "..."}`.
#[no_mangle]
pub unsafe extern "C" fn formfill_start_session(h: *const FfSupervisor, request: FfStr) -> FfResult {
    if h.is_null() {
        return error_result(FF_ERR_ARG, "null handle");
    }
    let handle = &*h;
    let Some(text) = request.as_str() else {
        return error_result(FF_ERR_ARG, "request is not UTF-8");
    };
    let req: StartRequest<'_> = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(e) => return error_result(FF_ERR_PAYLOAD, e),
    };

    let req = SessionRequest {
        entities: build_entity_batch(&handle.builder, &req.entities),
        fields: fields_from_slots(&req.fields),
        reference_date: req.reference_date,
        template: req.template.map(Cow::into_owned),
    };
    json_result(handle.inner.start_session(req).map(|session_id| Started { session_id }))
}

#[no_mangle]
pub unsafe extern "C" fn formfill_get_state(h: *const FfSupervisor, session: FfStr) -> FfResult {
    if h.is_null() {
        return error_result(FF_ERR_ARG, "null handle");
    }
    let id = match session_id(session) {
        Ok(id) => id,
        Err(r) => return r,
    };
    json_result((*h).inner.get_state(id))
}

/// An empty `value` clears the field.
#[no_mangle]
pub unsafe extern "C" fn formfill_apply_edit(
    h: *const FfSupervisor,
    session: FfStr,
    field_id: FfStr,
    value: FfStr,
) -> FfResult {
    if h.is_null() {
        return error_result(FF_ERR_ARG, "null handle");
    }
    let id = match session_id(session) {
        Ok(id) => id,
        Err(r) => return r,
    };
    let (Some(field_id), Some(value)) = (field_id.as_str(), value.as_str()) else {
        return error_result(FF_ERR_ARG, "field id or value is not UTF-8");
    };
    json_result((*h).inner.apply_edit(id, field_id, value))
}

/// `choice` is `{"kind": "field", "id": "..."}` or `{"kind": "entity", "id": "..."}`.
#[no_mangle]
pub unsafe extern "C" fn formfill_resolve_clarification(
    h: *const FfSupervisor,
    session: FfStr,
    clarification_id: FfStr,
    choice: FfStr,
) -> FfResult {
    if h.is_null() {
        return error_result(FF_ERR_ARG, "null handle");
    }
    let id = match session_id(session) {
        Ok(id) => id,
        Err(r) => return r,
    };
    let (Some(clarification_id), Some(choice)) = (clarification_id.as_str(), choice.as_str()) else {
        return error_result(FF_ERR_ARG, "clarification id or choice is not UTF-8");
    };
    let choice: Choice = match serde_json::from_str(choice) {
        Ok(c) => c,
        Err(e) => return error_result(FF_ERR_PAYLOAD, e),
    };
    json_result((*h).inner.resolve_clarification(id, clarification_id, choice))
}

/// Body: `{"outcome": "confirmed"}` or `{"outcome": "blocked", ...}`.
#[no_mangle]
pub unsafe extern "C" fn formfill_confirm(h: *const FfSupervisor, session: FfStr) -> FfResult {
    if h.is_null() {
        return error_result(FF_ERR_ARG, "null handle");
    }
    let id = match session_id(session) {
        Ok(id) => id,
        Err(r) => return r,
    };
    json_result((*h).inner.confirm(id))
}

/// Report the downstream render outcome. `render_ok == 0` keeps the session
/// Confirmed for a retry; `reason` may be null.
#[no_mangle]
pub unsafe extern "C" fn formfill_finalize(
    h: *const FfSupervisor,
    session: FfStr,
    render_ok: u8,
    reason: FfStr,
) -> FfResult {
    if h.is_null() {
        return error_result(FF_ERR_ARG, "null handle");
    }
    let id = match session_id(session) {
        Ok(id) => id,
        Err(r) => return r,
    };
    let outcome = if render_ok != 0 {
        ReportedOutcome(Ok(()))
    } else {
        ReportedOutcome(Err(reason.as_str().unwrap_or("renderer reported failure").to_string()))
    };
    json_result((*h).inner.finalize(id, &outcome))
}

#[no_mangle]
pub unsafe extern "C" fn formfill_cancel(h: *const FfSupervisor, session: FfStr) -> FfResult {
    if h.is_null() {
        return error_result(FF_ERR_ARG, "null handle");
    }
    let id = match session_id(session) {
        Ok(id) => id,
        Err(r) => return r,
    };
    json_result((*h).inner.cancel(id))
}

/// Snapshot format (binary):
/// [u32 magic = "FFS1"][u32 version = 1][u32 body_len][body: JSON SupervisorSnapshot]
///
/// Returns an empty buffer if the body does not fit the length header.
#[no_mangle]
pub unsafe extern "C" fn formfill_snapshot(h: *const FfSupervisor) -> FfBytes {
    if h.is_null() {
        return FfBytes::empty();
    }
    let snap = (*h).inner.snapshot();
    let Ok(body) = serde_json::to_vec(&snap) else {
        return FfBytes::empty();
    };

    let Ok(body_len) = u32::try_from(body.len()) else {
        return FfBytes::empty();
    };

    let mut buf: Vec<u8> = Vec::with_capacity(12 + body.len());
    buf.extend_from_slice(&SNAP_MAGIC.to_le_bytes());
    buf.extend_from_slice(&SNAP_VERSION.to_le_bytes());
    buf.extend_from_slice(&body_len.to_le_bytes());
    buf.extend_from_slice(&body);
    FfBytes::from_vec(buf)
}

#[no_mangle]
pub unsafe extern "C" fn formfill_bytes_free(b: FfBytes) {
    if !b.ptr.is_null() {
        let slice_ptr = std::ptr::slice_from_raw_parts_mut(b.ptr, b.len);
        drop(Box::from_raw(slice_ptr));
    }
}

/// Free the body of an `FfResult`.
#[no_mangle]
pub unsafe extern "C" fn formfill_result_free(r: FfResult) {
    formfill_bytes_free(r.body);
}

fn parse_snapshot(data: &[u8]) -> Result<SupervisorSnapshot, i32> {
    let read_u32 = |i: usize| -> Option<u32> {
        let b = data.get(i..i + 4)?;
        Some(u32::from_le_bytes(b.try_into().ok()?))
    };

    let magic = read_u32(0).ok_or(FF_ERR_PAYLOAD)?;
    if magic != SNAP_MAGIC {
        return Err(FF_ERR_SNAP_MAGIC);
    }
    let ver = read_u32(4).ok_or(FF_ERR_PAYLOAD)?;
    if ver != SNAP_VERSION {
        return Err(FF_ERR_SNAP_VERSION);
    }
    let body_len = read_u32(8).ok_or(FF_ERR_PAYLOAD)? as usize;
    let body = data.get(12..12 + body_len).ok_or(FF_ERR_PAYLOAD)?;
    serde_json::from_slice(body).map_err(|_| FF_ERR_PAYLOAD)
}

/// Restore from a `formfill_snapshot` buffer; `merge != 0` keeps sessions
/// not present in the snapshot.
#[no_mangle]
pub unsafe extern "C" fn formfill_restore(
    h: *const FfSupervisor,
    bytes: *const u8,
    len: usize,
    merge: u8,
) -> FfRestoreStats {
    if h.is_null() || bytes.is_null() || len < 12 {
        return FfRestoreStats { applied: 0, overwritten: 0, rc: FF_ERR_ARG };
    }
    let data = std::slice::from_raw_parts(bytes, len);
    let snap = match parse_snapshot(data) {
        Ok(s) => s,
        Err(rc) => return FfRestoreStats { applied: 0, overwritten: 0, rc },
    };

    let handle = &*h;
    let stats = if merge != 0 {
        handle.inner.restore_merge(snap)
    } else {
        handle.inner.restore(snap)
    };

    FfRestoreStats {
        applied: stats.applied as u32,
        overwritten: stats.overwritten as u32,
        rc: FF_OK,
    }
}
