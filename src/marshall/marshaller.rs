//! Versioned Marshaller
//!
//! Frames tagged objects behind a two-byte version magic and hands out
//! scoped input/output sessions over a byte stream.
//!
//! # Wire Format
//!
//! ```text
//! stream := MAGIC_VERSION object*
//! object := TAG_BYTE payload
//! ```
//!
//! # Sessions
//!
//! Output is staged in a pooled scratch buffer and only reaches the caller's
//! sink on [`VersionAwareMarshaller::finish_output`]. A session dropped on an
//! error path releases its buffer without touching the sink, so a failed write
//! never leaves half an object behind.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use super::codec::CodecRegistry;
use super::object::Object;
use super::varint;
use crate::error::{Error, Result};

/// Version magic written at the head of every top-level stream
pub const VERSION_MAGIC: u16 = 0x4c01;

/// Magics this build can read
pub const SUPPORTED_VERSIONS: &[u16] = &[VERSION_MAGIC];

/// Nesting limit for recursive object graphs
pub const MAX_OBJECT_DEPTH: usize = 64;

/// Scratch buffers kept for reuse
const POOL_CAPACITY: usize = 16;

/// Scratch buffers larger than this are not returned to the pool
const MAX_POOLED_BUFFER: usize = 64 * 1024;

// =============================================================================
// Marshaller
// =============================================================================

struct MarshallerInner {
    registry: CodecRegistry,
    pool: Mutex<Vec<BytesMut>>,
    active_sessions: AtomicUsize,
    objects_written: AtomicU64,
    objects_read: AtomicU64,
}

/// Marshaller that frames streams with a version magic
///
/// Cheap to clone; clones share the codec registry and buffer pool.
#[derive(Clone)]
pub struct VersionAwareMarshaller {
    inner: Arc<MarshallerInner>,
}

impl VersionAwareMarshaller {
    /// Create a marshaller over the given registry
    pub fn new(registry: CodecRegistry) -> Self {
        Self {
            inner: Arc::new(MarshallerInner {
                registry,
                pool: Mutex::new(Vec::with_capacity(POOL_CAPACITY)),
                active_sessions: AtomicUsize::new(0),
                objects_written: AtomicU64::new(0),
                objects_read: AtomicU64::new(0),
            }),
        }
    }

    /// Create a marshaller that only knows the built-in codecs
    pub fn with_builtins() -> Self {
        Self::new(CodecRegistry::with_builtins())
    }

    /// The codec registry
    pub fn registry(&self) -> &CodecRegistry {
        &self.inner.registry
    }

    /// Number of sessions currently acquired
    pub fn active_sessions(&self) -> usize {
        self.inner.active_sessions.load(Ordering::Acquire)
    }

    /// Total top-level and nested objects written
    pub fn objects_written(&self) -> u64 {
        self.inner.objects_written.load(Ordering::Relaxed)
    }

    /// Total top-level and nested objects read
    pub fn objects_read(&self) -> u64 {
        self.inner.objects_read.load(Ordering::Relaxed)
    }

    fn acquire_buffer(&self) -> BytesMut {
        self.inner.active_sessions.fetch_add(1, Ordering::AcqRel);
        self.inner.pool.lock().pop().unwrap_or_default()
    }

    fn release_buffer(&self, mut buf: BytesMut) {
        self.inner.active_sessions.fetch_sub(1, Ordering::AcqRel);
        if buf.capacity() > MAX_POOLED_BUFFER {
            return;
        }
        buf.clear();
        let mut pool = self.inner.pool.lock();
        if pool.len() < POOL_CAPACITY {
            pool.push(buf);
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Acquire an output session writing to `sink`
    ///
    /// A top-level session (`is_reentrant == false`) starts with the version
    /// magic; a reentrant one continues a stream that already has it.
    pub fn start_output<'a>(&'a self, sink: &'a mut BytesMut, is_reentrant: bool) -> OutputSession<'a> {
        let mut buf = self.acquire_buffer();
        if !is_reentrant {
            buf.put_u16(VERSION_MAGIC);
        }
        OutputSession {
            marshaller: self,
            sink,
            buf,
            depth: 0,
        }
    }

    /// Write one tagged object into the session
    pub fn write_object(&self, session: &mut OutputSession<'_>, object: &Object) -> Result<()> {
        session.write_object(object)
    }

    /// Flush the session into its sink and release it
    pub fn finish_output(&self, session: OutputSession<'_>) {
        session.finish();
    }

    /// Encode one object as a complete top-level stream
    pub fn object_to_bytes(&self, object: &Object) -> Result<Bytes> {
        let mut sink = BytesMut::new();
        let mut session = self.start_output(&mut sink, false);
        session.write_object(object)?;
        session.finish();
        Ok(sink.freeze())
    }

    /// Whether every type reachable from `object` has a codec
    ///
    /// Ordered sequences are checked element by element; other composite
    /// types are only checked at the top level.
    pub fn is_marshallable(&self, object: &Object) -> bool {
        if self.registry().codec_for_object(object).is_err() {
            return false;
        }
        match object.downcast_ref::<Vec<Object>>() {
            Some(elements) => elements.iter().all(|e| self.is_marshallable(e)),
            None => true,
        }
    }

    // =========================================================================
    // Input
    // =========================================================================

    /// Acquire an input session reading from `source`
    ///
    /// A top-level session consumes and validates the version magic.
    pub fn start_input(&self, source: Bytes, is_reentrant: bool) -> Result<InputSession<'_>> {
        self.inner.active_sessions.fetch_add(1, Ordering::AcqRel);
        let mut session = InputSession {
            marshaller: self,
            source,
            strict: false,
            depth: 0,
        };
        if !is_reentrant {
            let found = session.read_u16()?;
            if !SUPPORTED_VERSIONS.contains(&found) {
                return Err(Error::IncompatibleVersion {
                    found,
                    expected: VERSION_MAGIC,
                });
            }
        }
        Ok(session)
    }

    /// Read one tagged object from the session
    pub fn read_object(&self, session: &mut InputSession<'_>) -> Result<Object> {
        session.read_object()
    }

    /// Release the session, rejecting leftover bytes when it is strict
    pub fn finish_input(&self, session: InputSession<'_>) -> Result<()> {
        if session.strict && session.source.has_remaining() {
            return Err(Error::malformed(format!(
                "{} trailing byte(s) after last object",
                session.source.remaining()
            )));
        }
        Ok(())
    }

    /// Decode a complete top-level stream holding exactly one object
    pub fn object_from_bytes(&self, bytes: Bytes) -> Result<Object> {
        let mut session = self.start_input(bytes, false)?;
        session.set_strict(true);
        let object = session.read_object()?;
        self.finish_input(session)?;
        Ok(object)
    }
}

impl std::fmt::Debug for VersionAwareMarshaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionAwareMarshaller")
            .field("codecs", &self.registry().len())
            .field("active_sessions", &self.active_sessions())
            .finish()
    }
}

// =============================================================================
// Output Session
// =============================================================================

/// Scoped output session
///
/// Released on drop; only [`VersionAwareMarshaller::finish_output`] moves the
/// staged bytes into the sink.
pub struct OutputSession<'a> {
    marshaller: &'a VersionAwareMarshaller,
    sink: &'a mut BytesMut,
    buf: BytesMut,
    depth: usize,
}

impl<'a> OutputSession<'a> {
    /// The owning marshaller
    pub fn marshaller(&self) -> &'a VersionAwareMarshaller {
        self.marshaller
    }

    /// Bytes staged so far (including the magic for top-level sessions)
    pub fn staged_len(&self) -> usize {
        self.buf.len()
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.put_u8(value);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.put_u8(value as u8);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.put_i32(value);
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.put_i64(value);
    }

    pub fn write_unsigned_long(&mut self, value: u64) {
        varint::write_unsigned_long(&mut self.buf, value);
    }

    /// Length-prefixed byte blob
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.write_unsigned_long(bytes.len() as u64);
        self.buf.put_slice(bytes);
    }

    /// Length-prefixed UTF-8 string
    pub fn write_str(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    /// Tag byte followed by the codec payload
    pub fn write_object(&mut self, object: &Object) -> Result<()> {
        if self.depth >= MAX_OBJECT_DEPTH {
            return Err(Error::non_serializable(
                object.type_name(),
                format!("object graph deeper than {MAX_OBJECT_DEPTH}"),
            ));
        }
        let marshaller = self.marshaller;
        let codec = marshaller.registry().codec_for_object(object)?;
        self.buf.put_u8(codec.tag());
        self.depth += 1;
        let result = codec.write(self, object);
        self.depth -= 1;
        marshaller.inner.objects_written.fetch_add(1, Ordering::Relaxed);
        result
    }

    fn finish(self) {
        self.sink.extend_from_slice(&self.buf);
    }
}

impl Drop for OutputSession<'_> {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.marshaller.release_buffer(buf);
    }
}

// =============================================================================
// Input Session
// =============================================================================

/// Scoped input session over a byte source
pub struct InputSession<'a> {
    marshaller: &'a VersionAwareMarshaller,
    source: Bytes,
    strict: bool,
    depth: usize,
}

impl<'a> InputSession<'a> {
    /// The owning marshaller
    pub fn marshaller(&self) -> &'a VersionAwareMarshaller {
        self.marshaller
    }

    /// Reject leftover bytes on finish
    pub fn set_strict(&mut self, strict: bool) {
        self.strict = strict;
    }

    /// Unread bytes
    pub fn remaining(&self) -> usize {
        self.source.remaining()
    }

    fn ensure(&self, needed: usize, what: &str) -> Result<()> {
        if self.source.remaining() < needed {
            return Err(Error::malformed(format!(
                "short read on {what}: needed {needed} byte(s), {} remaining",
                self.source.remaining()
            )));
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1, "u8")?;
        Ok(self.source.get_u8())
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        self.ensure(2, "u16")?;
        Ok(self.source.get_u16())
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::malformed(format!("invalid boolean byte 0x{other:02x}"))),
        }
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.ensure(4, "i32")?;
        Ok(self.source.get_i32())
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.ensure(8, "i64")?;
        Ok(self.source.get_i64())
    }

    pub fn read_unsigned_long(&mut self) -> Result<u64> {
        varint::read_unsigned_long(&mut self.source)
    }

    pub fn read_unsigned_int(&mut self) -> Result<u32> {
        varint::read_unsigned_int(&mut self.source)
    }

    /// Length-prefixed byte blob, sliced without copying
    pub fn read_bytes(&mut self) -> Result<Bytes> {
        let len = self.read_unsigned_long()?;
        let len = usize::try_from(len).map_err(|_| Error::malformed("blob length overflows usize"))?;
        self.ensure(len, "blob")?;
        Ok(self.source.split_to(len))
    }

    /// Length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|e| Error::malformed(format!("invalid UTF-8: {e}")))
    }

    /// Tag byte followed by the codec payload
    pub fn read_object(&mut self) -> Result<Object> {
        if self.depth >= MAX_OBJECT_DEPTH {
            return Err(Error::malformed(format!("object graph deeper than {MAX_OBJECT_DEPTH}")));
        }
        let tag = self.read_u8()?;
        let marshaller = self.marshaller;
        let codec = marshaller.registry().codec_for_tag(tag)?;
        self.depth += 1;
        let result = codec.read(self);
        self.depth -= 1;
        marshaller.inner.objects_read.fetch_add(1, Ordering::Relaxed);
        result
    }
}

impl Drop for InputSession<'_> {
    fn drop(&mut self) {
        self.marshaller
            .inner
            .active_sessions
            .fetch_sub(1, Ordering::AcqRel);
    }
}

// =============================================================================
// Tests
// =============================================================================
