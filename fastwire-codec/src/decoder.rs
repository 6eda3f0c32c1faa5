/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FAST message decoder.
//!
//! The decoder reads the root presence map, resolves the template id, and
//! walks the template's instruction tree, consuming the stream in exactly
//! the order the encoder produced it: pmap, template id, fields, with each
//! nested scope's pmap preceding its fields. Values are deposited into the
//! message through the adapter.

use crate::dictionary::Dictionary;
use crate::message::{FastMessage, FieldDescriptor};
use crate::operators::{self, DecodeScope};
use crate::pmap::PresenceMap;
use crate::reader::{Reader, MAX_BYTES_32};
use crate::trace::WireLog;
use fastwire_core::{BindError, DecodeError, FastError, Result};
use fastwire_template::{
    segment_claims_pmap, FieldType, Instruction, Presence, TemplateRegistry,
};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::sync::Arc;

/// FAST protocol decoder.
///
/// Like the encoder, the decoder guards its interior with a mutex so that
/// concurrent callers serialize whole `decode` calls.
pub struct Decoder<R> {
    inner: Mutex<DecoderInner<R>>,
}

struct DecoderInner<R> {
    reader: Reader<R>,
    templates: Arc<TemplateRegistry>,
    dict: Dictionary,
    last_template_id: Option<u32>,
    log: Option<WireLog>,
}

impl<R: Read> Decoder<R> {
    /// Creates a decoder reading FAST messages from `source`.
    ///
    /// # Arguments
    /// * `source` - The input stream
    /// * `templates` - The linked template registry
    #[must_use]
    pub fn new(source: R, templates: impl Into<Arc<TemplateRegistry>>) -> Self {
        Self {
            inner: Mutex::new(DecoderInner {
                reader: Reader::new(source),
                templates: templates.into(),
                dict: Dictionary::new(),
                last_template_id: None,
                log: None,
            }),
        }
    }

    /// Attaches a wire-level trace sink at construction time.
    #[must_use]
    pub fn with_wire_log(self, sink: Box<dyn Write + Send>) -> Self {
        self.set_log(Some(sink));
        self
    }

    /// Attaches or removes the wire-level trace sink.
    pub fn set_log(&self, sink: Option<Box<dyn Write + Send>>) {
        self.inner.lock().log = sink.map(WireLog::new);
    }

    /// Decodes one message from the stream into `msg`.
    ///
    /// # Arguments
    /// * `msg` - The message to fill; its template id is set from the stream
    ///
    /// # Errors
    /// Returns `FastError` on unknown templates (D9), absent mandatory
    /// values (D5), malformed deltas (D7), truncated input, or source I/O
    /// errors. The message is untouched until the template is resolved.
    pub fn decode<M: FastMessage>(&self, msg: &mut M) -> Result<()> {
        self.inner.lock().decode_message(msg)
    }

    /// Clears the operator dictionary and the remembered template id,
    /// mirroring the FAST reset control.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.dict.reset();
        inner.last_template_id = None;
        tracing::debug!("decoder dictionary reset");
    }

    /// Consumes the decoder and returns the source.
    #[must_use]
    pub fn into_source(self) -> R {
        self.inner.into_inner().reader.into_inner()
    }
}

impl<R: Read> DecoderInner<R> {
    fn decode_message<M: FastMessage>(&mut self, msg: &mut M) -> Result<()> {
        let mut pmap = self.reader.read_pmap()?;

        let tid = if pmap.next_bit() {
            let raw = self.reader.read_uint(MAX_BYTES_32)?;
            u32::try_from(raw).map_err(|_| FastError::Decode(DecodeError::IntegerOverflow))?
        } else {
            self.last_template_id
                .ok_or(FastError::Decode(DecodeError::MissingTemplateId))?
        };

        let template = self
            .templates
            .get(tid)
            .ok_or(FastError::Decode(DecodeError::UnknownTemplate(tid)))?
            .clone();
        self.last_template_id = Some(tid);

        tracing::trace!(template_id = tid, template = %template.name, "decoding message");
        if let Some(log) = self.log.as_mut() {
            log.line(format_args!("// ----- new message ----- //"));
            log.line(format_args!("template = {}", tid));
        }

        msg.set_template_id(tid);
        self.decode_segment(&template.instructions, msg, tid, &mut pmap)
    }

    fn decode_segment<M: FastMessage>(
        &mut self,
        instructions: &[Instruction],
        msg: &mut M,
        tid: u32,
        pmap: &mut PresenceMap,
    ) -> Result<()> {
        for instr in instructions {
            match instr.field_type {
                FieldType::Group => self.decode_group(instr, msg, tid, pmap)?,
                FieldType::Sequence => self.decode_sequence(instr, msg, tid, pmap)?,
                _ => {
                    let desc = FieldDescriptor {
                        id: instr.id,
                        name: &instr.name,
                        field_type: instr.field_type,
                    };
                    let mut scope = DecodeScope {
                        reader: &mut self.reader,
                        pmap: &mut *pmap,
                        dict: &mut self.dict,
                        template_id: tid,
                    };
                    let value = operators::decode_field(&mut scope, instr)?;

                    if let Some(log) = self.log.as_mut() {
                        log.line(format_args!(
                            "{} = {}",
                            instr.name,
                            value
                                .as_ref()
                                .map_or_else(|| "null".to_string(), ToString::to_string)
                        ));
                    }

                    msg.set(&desc, value)?;
                }
            }
        }
        Ok(())
    }

    fn decode_group<M: FastMessage>(
        &mut self,
        instr: &Instruction,
        msg: &mut M,
        tid: u32,
        pmap: &mut PresenceMap,
    ) -> Result<()> {
        if instr.presence == Presence::Optional && !pmap.next_bit() {
            return Ok(());
        }

        let desc = FieldDescriptor {
            id: instr.id,
            name: &instr.name,
            field_type: instr.field_type,
        };

        if let Some(log) = self.log.as_mut() {
            log.line(format_args!("group {}:", instr.name));
            log.shift();
        }

        msg.enter(&desc, None)?;
        let decoded = self.decode_scope(&instr.instructions, msg, tid);
        msg.leave();

        if let Some(log) = self.log.as_mut() {
            log.unshift();
        }
        decoded
    }

    fn decode_sequence<M: FastMessage>(
        &mut self,
        instr: &Instruction,
        msg: &mut M,
        tid: u32,
        pmap: &mut PresenceMap,
    ) -> Result<()> {
        let desc = FieldDescriptor {
            id: instr.id,
            name: &instr.name,
            field_type: instr.field_type,
        };
        let length_instr =
            instr
                .length_instruction()
                .ok_or_else(|| fastwire_core::TemplateError::SequenceWithoutLength {
                    field: instr.name.clone(),
                })?;

        let mut scope = DecodeScope {
            reader: &mut self.reader,
            pmap: &mut *pmap,
            dict: &mut self.dict,
            template_id: tid,
        };
        let length = operators::decode_field(&mut scope, length_instr)?;

        if let Some(log) = self.log.as_mut() {
            log.line(format_args!("sequence {}:", instr.name));
            log.line(format_args!(
                "  length = {}",
                length
                    .as_ref()
                    .map_or_else(|| "null".to_string(), ToString::to_string)
            ));
        }

        let Some(length) = length else {
            return Ok(());
        };
        let length = length
            .as_u32()
            .ok_or_else(|| BindError::TypeMismatch {
                field: length_instr.name.clone(),
                expected: "uInt32",
                actual: "other",
            })? as usize;

        msg.set_length(&desc, length)?;
        for index in 0..length {
            if let Some(log) = self.log.as_mut() {
                log.line(format_args!("elem[{}]:", index));
                log.shift();
            }

            msg.enter(&desc, Some(index))?;
            let decoded = self.decode_scope(instr.element_instructions(), msg, tid);
            msg.leave();

            if let Some(log) = self.log.as_mut() {
                log.unshift();
            }
            decoded?;
        }
        Ok(())
    }

    /// Reads one nested scope: its own pmap first, when the segment claims
    /// one, then its fields.
    fn decode_scope<M: FastMessage>(
        &mut self,
        instructions: &[Instruction],
        msg: &mut M,
        tid: u32,
    ) -> Result<()> {
        let mut pmap = if segment_claims_pmap(instructions) {
            self.reader.read_pmap()?
        } else {
            PresenceMap::new()
        };
        self.decode_segment(instructions, msg, tid, &mut pmap)
    }
}
