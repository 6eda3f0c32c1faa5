/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! FAST message encoder.
//!
//! The encoder walks the instruction tree of the selected template and
//! routes each field through its operator. A presence map must precede the
//! field bytes of its scope, but its bits are only known once the scope has
//! been fully encoded, so every scope buffers its pmap and field bytes
//! separately and serializes pmap-then-fields into its parent on exit. The
//! outermost scope is flushed to the sink only when the whole message
//! succeeded; a failed call emits nothing.

use crate::dictionary::Dictionary;
use crate::message::{coerce, FastMessage, FieldDescriptor};
use crate::operators::{self, EncodeScope};
use crate::pmap::PresenceMap;
use crate::trace::WireLog;
use crate::writer::Writer;
use fastwire_core::{EncodeError, FastError, Result, TemplateError, Value};
use fastwire_template::{FieldType, Instruction, Presence, TemplateRegistry};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;

/// FAST protocol encoder.
///
/// The operator dictionary is shared mutable state, so the encoder guards
/// its interior with a mutex and serializes whole `encode` calls; a single
/// encoder can be shared between threads, and separate encoders are fully
/// independent.
pub struct Encoder<W> {
    inner: Mutex<EncoderInner<W>>,
}

struct EncoderInner<W> {
    sink: W,
    templates: Arc<TemplateRegistry>,
    dict: Dictionary,
    log: Option<WireLog>,
}

impl<W: Write> Encoder<W> {
    /// Creates an encoder writing FAST messages to `sink`.
    ///
    /// # Arguments
    /// * `sink` - The output target
    /// * `templates` - The linked template registry
    #[must_use]
    pub fn new(sink: W, templates: impl Into<Arc<TemplateRegistry>>) -> Self {
        Self {
            inner: Mutex::new(EncoderInner {
                sink,
                templates: templates.into(),
                dict: Dictionary::new(),
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

    /// Encodes one message and flushes its bytes to the sink.
    ///
    /// # Arguments
    /// * `msg` - The message to encode; the adapter cursor is advanced and
    ///   restored during the walk
    ///
    /// # Errors
    /// Returns `FastError` on unknown templates (D9), missing mandatory
    /// fields (D5), binding failures, or sink I/O errors. On error nothing
    /// reaches the sink; the dictionary is not rolled back.
    pub fn encode<M: FastMessage>(&self, msg: &mut M) -> Result<()> {
        self.inner.lock().encode_message(msg)
    }

    /// Clears the operator dictionary, mirroring the FAST reset control.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.dict.reset();
        tracing::debug!("encoder dictionary reset");
    }

    /// Consumes the encoder and returns the sink.
    #[must_use]
    pub fn into_sink(self) -> W {
        self.inner.into_inner().sink
    }
}

impl<W: Write> EncoderInner<W> {
    fn encode_message<M: FastMessage>(&mut self, msg: &mut M) -> Result<()> {
        let tid = msg
            .template_id()
            .ok_or(FastError::Encode(EncodeError::MissingTemplateId))?;
        let template = self
            .templates
            .get(tid)
            .ok_or(FastError::Encode(EncodeError::UnknownTemplate(tid)))?
            .clone();

        tracing::trace!(template_id = tid, template = %template.name, "encoding message");
        if let Some(log) = self.log.as_mut() {
            log.line(format_args!("// ----- new message ----- //"));
            log.line(format_args!("template = {}", tid));
        }

        let mut pmap = PresenceMap::new();
        let mut writer = Writer::new();

        // the template id occupies the first bit of the root pmap
        pmap.append(true);
        writer.write_uint(false, u64::from(tid));

        self.encode_segment(&template.instructions, msg, tid, &mut pmap, &mut writer)?;

        let mut out = Vec::with_capacity(writer.len() + 4);
        out.extend_from_slice(&pmap.to_wire());
        out.extend_from_slice(writer.as_bytes());

        if let Some(log) = self.log.as_mut() {
            log.hex("message", &out);
        }

        self.sink.write_all(&out)?;
        Ok(())
    }

    fn encode_segment<M: FastMessage>(
        &mut self,
        instructions: &[Instruction],
        msg: &mut M,
        tid: u32,
        pmap: &mut PresenceMap,
        writer: &mut Writer,
    ) -> Result<()> {
        for instr in instructions {
            match instr.field_type {
                FieldType::Group => self.encode_group(instr, msg, tid, pmap, writer)?,
                FieldType::Sequence => self.encode_sequence(instr, msg, tid, pmap, writer)?,
                _ => {
                    let desc = FieldDescriptor {
                        id: instr.id,
                        name: &instr.name,
                        field_type: instr.field_type,
                    };
                    let value = msg
                        .get(&desc)?
                        .map(|v| coerce(v, instr.field_type, &instr.name))
                        .transpose()?;

                    if let Some(log) = self.log.as_mut() {
                        log.line(format_args!("{} = {}", instr.name, render(&value)));
                    }

                    let mut scope = EncodeScope {
                        writer: &mut *writer,
                        pmap: &mut *pmap,
                        dict: &mut self.dict,
                        template_id: tid,
                    };
                    operators::encode_field(&mut scope, instr, value)?;
                }
            }
        }
        Ok(())
    }

    fn encode_group<M: FastMessage>(
        &mut self,
        instr: &Instruction,
        msg: &mut M,
        tid: u32,
        pmap: &mut PresenceMap,
        writer: &mut Writer,
    ) -> Result<()> {
        let desc = FieldDescriptor {
            id: instr.id,
            name: &instr.name,
            field_type: instr.field_type,
        };
        let present = msg.group_present(&desc)?;

        match instr.presence {
            Presence::Optional => pmap.append(present),
            Presence::Mandatory if !present => {
                return Err(FastError::Encode(EncodeError::MissingMandatoryField {
                    name: instr.name.clone(),
                }));
            }
            Presence::Mandatory => {}
        }
        if !present {
            return Ok(());
        }

        if let Some(log) = self.log.as_mut() {
            log.line(format_args!("group {}:", instr.name));
            log.shift();
        }

        msg.enter(&desc, None)?;
        let flushed = self.encode_scope(&instr.instructions, msg, tid, writer);
        msg.leave();

        if let Some(log) = self.log.as_mut() {
            log.unshift();
        }
        flushed
    }

    fn encode_sequence<M: FastMessage>(
        &mut self,
        instr: &Instruction,
        msg: &mut M,
        tid: u32,
        pmap: &mut PresenceMap,
        writer: &mut Writer,
    ) -> Result<()> {
        let desc = FieldDescriptor {
            id: instr.id,
            name: &instr.name,
            field_type: instr.field_type,
        };
        let length_instr =
            instr
                .length_instruction()
                .ok_or_else(|| TemplateError::SequenceWithoutLength {
                    field: instr.name.clone(),
                })?;
        let length = msg.get_length(&desc)?;

        if let Some(log) = self.log.as_mut() {
            log.line(format_args!("sequence {}:", instr.name));
            log.line(format_args!(
                "  length = {}",
                length.map_or_else(|| "null".to_string(), |n| n.to_string())
            ));
        }

        let Some(length) = length else {
            // absent sequence: the length field carries the null
            let mut scope = EncodeScope {
                writer: &mut *writer,
                pmap: &mut *pmap,
                dict: &mut self.dict,
                template_id: tid,
            };
            return operators::encode_field(&mut scope, length_instr, None);
        };

        let wire_length =
            u32::try_from(length).map_err(|_| EncodeError::ValueOutOfRange {
                name: instr.name.clone(),
            })?;
        let mut scope = EncodeScope {
            writer: &mut *writer,
            pmap: &mut *pmap,
            dict: &mut self.dict,
            template_id: tid,
        };
        operators::encode_field(&mut scope, length_instr, Some(Value::UInt32(wire_length)))?;

        for index in 0..length {
            if let Some(log) = self.log.as_mut() {
                log.line(format_args!("elem[{}]:", index));
                log.shift();
            }

            msg.enter(&desc, Some(index))?;
            let flushed = self.encode_scope(instr.element_instructions(), msg, tid, writer);
            msg.leave();

            if let Some(log) = self.log.as_mut() {
                log.unshift();
            }
            flushed?;
        }
        Ok(())
    }

    /// Encodes one nested scope into fresh buffers, then serializes pmap
    /// and field bytes into the parent writer. A scope whose instructions
    /// never claimed a bit emits no pmap at all.
    fn encode_scope<M: FastMessage>(
        &mut self,
        instructions: &[Instruction],
        msg: &mut M,
        tid: u32,
        parent: &mut Writer,
    ) -> Result<()> {
        let mut pmap = PresenceMap::new();
        let mut writer = Writer::new();
        self.encode_segment(instructions, msg, tid, &mut pmap, &mut writer)?;

        if !pmap.is_empty() {
            parent.write_pmap(&pmap);
        }
        parent.write_raw(writer.as_bytes());
        Ok(())
    }
}

fn render(value: &Option<Value>) -> String {
    value
        .as_ref()
        .map_or_else(|| "null".to_string(), ToString::to_string)
}
