/*!
 The state machine that tokenizes a `typedstream`'s bytes into the flat event
 stream defined in [`events`](crate::events) (spec.md §4.5).

 [`StreamReader`] is a forward-only, single-pass iterator: each call to
 [`Iterator::next`] returns the next event, or `None` once the byte source is
 exhausted. It resolves the head-byte reference-compression scheme and the
 type-encoding grammar itself but does not reconstruct objects; that is the
 [`Unarchiver`](crate::unarchiver::Unarchiver)'s job, built on top of this
 reader.
*/
use std::collections::VecDeque;

use crate::byte_reader::{ByteOrder, ByteReader};
use crate::error::{Error, Result};
use crate::events::{ByteOrderTag, Event, Scalar};
use crate::head_byte::{
    expect_end, expect_new, expect_nil, peek_tag, read_float, read_double, read_signed_int,
    read_unsigned_int, HeadTag, HEAD_END, HEAD_NIL,
};
use crate::reference_table::{Namespace, ReferenceTable};
use crate::type_encoding::{parse_type_encoding, Primitive, TypeDescriptor};

const SIGNATURE: &[u8] = b"\x04\x0bstreamtyped";

/// A c-string-namespace entry: either a plain string/selector payload or a
/// parsed type encoding, since both share the same id sequence
/// (spec.md §4.3 "The type-encoding byte string itself is a shared value").
#[derive(Debug, Clone)]
enum SharedString {
    Bytes(Vec<u8>),
    Encoding(Vec<TypeDescriptor>),
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    Initial,
    Emitting,
    Done,
}

/// Tokenizes a `typedstream` byte slice into [`Event`]s
pub struct StreamReader<'a> {
    reader: ByteReader<'a>,
    objects: ReferenceTable<()>,
    classes: ReferenceTable<()>,
    strings: ReferenceTable<SharedString>,
    pending: VecDeque<Event>,
    /// An error raised while staging a group's events, held back until the
    /// events already staged in `pending` ahead of it have been drained
    /// (spec.md §3 total ordering: an event already emitted must not be
    /// followed by one that logically preceded it).
    pending_error: Option<Error>,
    state: State,
    /// Whether at least one top-level typed-values group has been fully
    /// emitted. Distinguishes clean end-of-stream (EOF between groups) from
    /// a stream that is truncated before its first group (spec.md §8
    /// scenario 6).
    emitted_any_group: bool,
}

impl<'a> StreamReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            reader: ByteReader::new(bytes),
            objects: ReferenceTable::new(Namespace::Object),
            classes: ReferenceTable::new(Namespace::Class),
            strings: ReferenceTable::new(Namespace::CString),
            pending: VecDeque::new(),
            pending_error: None,
            state: State::Initial,
            emitted_any_group: false,
        }
    }

    /// Byte offset the underlying reader is currently positioned at, useful
    /// for diagnostics alongside the offsets already carried by [`Error`]
    pub fn position(&self) -> usize {
        self.reader.position()
    }

    fn read_header(&mut self) -> Result<Event> {
        if self.reader.remaining() < SIGNATURE.len() {
            return Err(Error::InvalidSignature);
        }
        let prefix = self.reader.read_exact(SIGNATURE.len())?;
        if prefix != SIGNATURE {
            return Err(Error::InvalidSignature);
        }

        let streamer_version = read_unsigned_int(&mut self.reader)?;
        if streamer_version != 4 {
            return Err(Error::UnsupportedStreamerVersion(streamer_version));
        }

        let byte_order = match self.reader.read_byte()? {
            0 => ByteOrderTag::Little,
            _ => ByteOrderTag::Big,
        };
        self.reader.set_byte_order(byte_order.into());

        let system_version = read_unsigned_int(&mut self.reader)?;

        Ok(Event::Header {
            streamer_version,
            byte_order,
            system_version,
        })
    }

    /// Fill `self.pending` with the events for one top-level `BeginTypedValues`
    /// group, recursing into nested objects/arrays/structs as needed.
    fn drive_one_group(&mut self) -> Result<()> {
        let types = self.read_type_encoding_group()?;
        self.pending.push_back(Event::BeginTypedValues(types.clone()));
        for descriptor in &types {
            self.drive_value(descriptor)?;
        }
        self.pending.push_back(Event::EndTypedValues);
        Ok(())
    }

    fn read_type_encoding_group(&mut self) -> Result<Vec<TypeDescriptor>> {
        match peek_tag(&mut self.reader)? {
            HeadTag::New => {
                expect_new(&mut self.reader)?;
                let length = read_unsigned_int(&mut self.reader)?;
                let bytes = self.reader.read_exact(length as usize)?;
                let parsed = parse_type_encoding(bytes)?;
                self.strings.intern(SharedString::Encoding(parsed.clone()));
                Ok(parsed)
            }
            HeadTag::Reference(id) => match self.strings.resolve(id)? {
                SharedString::Encoding(parsed) => Ok(parsed.clone()),
                SharedString::Bytes(_) => Err(Error::TypeMismatch {
                    expected: "type-encoding".to_string(),
                    actual: "c-string".to_string(),
                }),
            },
            HeadTag::Nil | HeadTag::End => Err(Error::MalformedHead {
                offset: self.reader.position(),
                byte: self.reader.peek_byte()?,
            }),
        }
    }

    fn drive_value(&mut self, descriptor: &TypeDescriptor) -> Result<()> {
        match descriptor {
            TypeDescriptor::Primitive(primitive) => self.drive_primitive(*primitive),
            TypeDescriptor::CString => self.drive_shared_string(false),
            TypeDescriptor::Selector => self.drive_shared_string(true),
            TypeDescriptor::Object => self.drive_object(),
            TypeDescriptor::Class => self.drive_class_value(),
            TypeDescriptor::Array { count, element } => {
                self.pending.push_back(Event::BeginArray { count: *count });
                for _ in 0..*count {
                    self.drive_value(element)?;
                }
                self.pending.push_back(Event::EndArray);
                Ok(())
            }
            TypeDescriptor::Struct { name, fields } | TypeDescriptor::Union { name, fields } => {
                self.pending.push_back(Event::BeginStruct { name: name.clone() });
                for field in fields {
                    self.drive_value(field)?;
                }
                self.pending.push_back(Event::EndStruct);
                Ok(())
            }
            TypeDescriptor::Bitfield(_) => Err(Error::UnsupportedType(descriptor.to_string())),
            TypeDescriptor::Pointer(_) | TypeDescriptor::Unknown => {
                Err(Error::UnsupportedType(descriptor.to_string()))
            }
            TypeDescriptor::UnknownEncoding(_) => {
                let raw = self.reader.read_exact(1)?.to_vec();
                self.pending.push_back(Event::UnsupportedAtom {
                    encoding: descriptor.to_string(),
                    raw,
                });
                Ok(())
            }
        }
    }

    fn drive_primitive(&mut self, primitive: Primitive) -> Result<()> {
        let scalar = if primitive.is_float() {
            if primitive.bits() == 32 {
                Scalar::Float(read_float(&mut self.reader)?)
            } else {
                Scalar::Double(read_double(&mut self.reader)?)
            }
        } else if primitive.is_signed() {
            let raw = read_signed_int(&mut self.reader)?;
            check_signed_range(primitive, raw)?;
            Scalar::Signed(raw)
        } else {
            let raw = read_unsigned_int(&mut self.reader)?;
            check_unsigned_range(primitive, raw)?;
            Scalar::Unsigned(raw)
        };
        self.pending.push_back(Event::Atom(scalar));
        Ok(())
    }

    fn drive_shared_string(&mut self, is_selector: bool) -> Result<()> {
        let (value, id) = match peek_tag(&mut self.reader)? {
            HeadTag::Nil => {
                expect_nil(&mut self.reader)?;
                (None, None)
            }
            HeadTag::Reference(id) => match self.strings.resolve(id)? {
                SharedString::Bytes(bytes) => (Some(bytes.clone()), Some(id)),
                SharedString::Encoding(_) => {
                    return Err(Error::TypeMismatch {
                        expected: "c-string".to_string(),
                        actual: "type-encoding".to_string(),
                    })
                }
            },
            HeadTag::New => {
                expect_new(&mut self.reader)?;
                let length = read_unsigned_int(&mut self.reader)?;
                let bytes = self.reader.read_exact(length as usize)?.to_vec();
                let id = self.strings.intern(SharedString::Bytes(bytes.clone()));
                (Some(bytes), Some(id))
            }
            HeadTag::End => {
                return Err(Error::MalformedHead {
                    offset: self.reader.position(),
                    byte: HEAD_END,
                })
            }
        };
        self.pending.push_back(if is_selector {
            Event::Selector { value }
        } else {
            Event::CString { value, id }
        });
        Ok(())
    }

    fn drive_class_value(&mut self) -> Result<()> {
        match peek_tag(&mut self.reader)? {
            HeadTag::Nil => {
                expect_nil(&mut self.reader)?;
                self.pending.push_back(Event::Nil);
            }
            HeadTag::Reference(id) => {
                self.classes.resolve(id)?;
                self.pending.push_back(Event::ClassReference { id });
            }
            HeadTag::New => {
                expect_new(&mut self.reader)?;
                let (name, version) = self.read_class_name_and_version()?;
                let id = self.classes.intern(());
                self.pending.push_back(Event::SingleClass { name, version, id });
            }
            HeadTag::End => {
                return Err(Error::MalformedHead {
                    offset: self.reader.position(),
                    byte: HEAD_END,
                })
            }
        }
        Ok(())
    }

    fn read_class_name_and_version(&mut self) -> Result<(Vec<u8>, i64)> {
        let length = read_unsigned_int(&mut self.reader)?;
        let name = self.reader.read_exact(length as usize)?.to_vec();
        let version = read_signed_int(&mut self.reader)?;
        Ok((name, version))
    }

    /// Reads a non-empty class chain (spec.md §3 "Invariants": "Class chains
    /// are non-empty unless the object is nil", guaranteed here because the
    /// caller only invokes this after observing `HEAD_NEW` for the object). A
    /// chain that terminates in `HEAD_NIL` before any `SingleClass` link is a
    /// malformed stream (spec.md §8), not an empty-but-valid chain.
    fn drive_class_chain(&mut self) -> Result<()> {
        let mut read_any_link = false;
        loop {
            match peek_tag(&mut self.reader)? {
                HeadTag::Nil => {
                    let offset = self.reader.position();
                    expect_nil(&mut self.reader)?;
                    if !read_any_link {
                        return Err(Error::MalformedHead {
                            offset,
                            byte: HEAD_NIL,
                        });
                    }
                    return Ok(());
                }
                HeadTag::Reference(id) => {
                    self.classes.resolve(id)?;
                    self.pending.push_back(Event::ClassReference { id });
                    return Ok(());
                }
                HeadTag::New => {
                    expect_new(&mut self.reader)?;
                    let (name, version) = self.read_class_name_and_version()?;
                    let id = self.classes.intern(());
                    self.pending.push_back(Event::SingleClass { name, version, id });
                    read_any_link = true;
                    // Continue the loop to read the next (parent) link.
                }
                HeadTag::End => {
                    return Err(Error::MalformedHead {
                        offset: self.reader.position(),
                        byte: HEAD_END,
                    })
                }
            }
        }
    }

    fn drive_object(&mut self) -> Result<()> {
        match peek_tag(&mut self.reader)? {
            HeadTag::Nil => {
                expect_nil(&mut self.reader)?;
                self.pending.push_back(Event::Nil);
                Ok(())
            }
            HeadTag::Reference(id) => {
                self.objects.resolve(id)?;
                self.pending.push_back(Event::ObjectReference { id });
                Ok(())
            }
            HeadTag::New => {
                expect_new(&mut self.reader)?;
                let id = self.objects.intern(());
                self.pending.push_back(Event::BeginObject { id });
                self.drive_class_chain()?;
                loop {
                    if self.reader.peek_byte()? == HEAD_END {
                        expect_end(&mut self.reader)?;
                        break;
                    }
                    self.drive_one_group()?;
                }
                self.pending.push_back(Event::EndObject);
                Ok(())
            }
            HeadTag::End => Err(Error::MalformedHead {
                offset: self.reader.position(),
                byte: HEAD_END,
            }),
        }
    }
}

fn check_signed_range(primitive: Primitive, raw: i64) -> Result<()> {
    let bits = primitive.bits();
    if bits >= 64 {
        return Ok(());
    }
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    if raw < min || raw > max {
        return Err(Error::ValueOutOfRange {
            encoding: TypeDescriptor::Primitive(primitive).to_string(),
            raw,
        });
    }
    Ok(())
}

fn check_unsigned_range(primitive: Primitive, raw: u64) -> Result<()> {
    let bits = primitive.bits();
    if bits >= 64 {
        return Ok(());
    }
    let max = (1u64 << bits) - 1;
    if raw > max {
        return Err(Error::ValueOutOfRange {
            encoding: TypeDescriptor::Primitive(primitive).to_string(),
            raw: raw as i64,
        });
    }
    Ok(())
}

impl<'a> Iterator for StreamReader<'a> {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.pending.pop_front() {
            return Some(Ok(event));
        }
        if let Some(why) = self.pending_error.take() {
            self.state = State::Done;
            return Some(Err(why));
        }

        match self.state {
            State::Initial => match self.read_header() {
                Ok(event) => {
                    self.state = State::Emitting;
                    Some(Ok(event))
                }
                Err(why) => {
                    self.state = State::Done;
                    Some(Err(why))
                }
            },
            State::Emitting => {
                if self.reader.is_at_end() {
                    self.state = State::Done;
                    if self.emitted_any_group {
                        return None;
                    }
                    return Some(Err(Error::Truncated {
                        offset: self.reader.position(),
                        requested: 1,
                        available: 0,
                    }));
                }
                match self.drive_one_group() {
                    Ok(()) => {
                        self.emitted_any_group = true;
                        self.pending.pop_front().map(Ok)
                    }
                    // Events already staged ahead of the error (e.g. the
                    // `BeginTypedValues` that opened this group) logically
                    // happened before it, so they drain first; the error
                    // itself is held in `pending_error` until they do.
                    Err(why) => match self.pending.pop_front() {
                        Some(event) => {
                            self.pending_error = Some(why);
                            Some(Ok(event))
                        }
                        None => {
                            self.state = State::Done;
                            Some(Err(why))
                        }
                    },
                }
            }
            State::Done => None,
        }
    }
}

/// An explicit byte-order override, useful when embedding the byte-reader's
/// choice into tests or tools that already know the order out of band.
pub fn byte_order_from_flag(flag: u8) -> ByteOrder {
    if flag == 0 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::head_byte::{HEAD_NEW, HEAD_NIL};

    fn header_bytes() -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.push(4); // streamer version, literal
        bytes.push(0); // little-endian
        bytes.push(1); // system version, literal
        bytes
    }

    fn push_new_cstring(bytes: &mut Vec<u8>, s: &[u8]) {
        bytes.push(HEAD_NEW);
        bytes.push(s.len() as u8);
        bytes.extend_from_slice(s);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut reader = StreamReader::new(b"not a typedstream at all...");
        assert!(matches!(reader.next(), Some(Err(Error::InvalidSignature))));
    }

    #[test]
    fn emits_header_first() {
        let bytes = header_bytes();
        let mut reader = StreamReader::new(&bytes);
        let event = reader.next().unwrap().unwrap();
        assert_eq!(
            event,
            Event::Header {
                streamer_version: 4,
                byte_order: ByteOrderTag::Little,
                system_version: 1,
            }
        );
    }

    #[test]
    fn truncated_after_header_is_an_error() {
        let bytes = header_bytes();
        let mut reader = StreamReader::new(&bytes);
        reader.next().unwrap().unwrap(); // header
        assert!(matches!(reader.next(), Some(Err(Error::Truncated { .. }))));
    }

    #[test]
    fn decodes_single_int_group() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"i");
        bytes.push(42);
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        let events: Vec<_> = reader.by_ref().take(3).map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                Event::BeginTypedValues(vec![TypeDescriptor::Primitive(Primitive::SInt)]),
                Event::Atom(Scalar::Signed(42)),
                Event::EndTypedValues,
            ]
        );
    }

    #[test]
    fn decodes_array_of_two_ints() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"[2i]");
        bytes.push(42);
        bytes.push((-7i8) as u8);
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        let events: Vec<_> = reader.by_ref().take(5).map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                Event::BeginTypedValues(vec![TypeDescriptor::Array {
                    count: 2,
                    element: Box::new(TypeDescriptor::Primitive(Primitive::SInt)),
                }]),
                Event::BeginArray { count: 2 },
                Event::Atom(Scalar::Signed(42)),
                Event::Atom(Scalar::Signed(-7)),
                Event::EndArray,
            ]
        );
        assert_eq!(reader.next().unwrap().unwrap(), Event::EndTypedValues);
    }

    #[test]
    fn decodes_nil_object() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"@");
        bytes.push(HEAD_NIL);
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        let events: Vec<_> = reader.by_ref().take(3).map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                Event::BeginTypedValues(vec![TypeDescriptor::Object]),
                Event::Nil,
                Event::EndTypedValues,
            ]
        );
    }

    #[test]
    fn decodes_object_with_single_class_and_string_field() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"@");
        bytes.push(HEAD_NEW); // begin object
        bytes.push(HEAD_NEW); // begin class
        bytes.push(8);
        bytes.extend_from_slice(b"NSObject");
        bytes.push(0); // version 0
        bytes.push(HEAD_NIL); // end of class chain
        push_new_cstring(&mut bytes, b"*"); // nested typed-values group: one cstring
        bytes.push(HEAD_NEW);
        bytes.push(5);
        bytes.extend_from_slice(b"hello");
        bytes.push(crate::head_byte::HEAD_END); // end object
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        let events: Vec<_> = reader.by_ref().take(8).map(Result::unwrap).collect();
        assert_eq!(
            events,
            vec![
                Event::BeginTypedValues(vec![TypeDescriptor::Object]),
                Event::BeginObject { id: 0 },
                Event::SingleClass {
                    name: b"NSObject".to_vec(),
                    version: 0,
                    id: 0,
                },
                Event::BeginTypedValues(vec![TypeDescriptor::CString]),
                Event::CString {
                    value: Some(b"hello".to_vec()),
                    // The c-string namespace is shared with type-encoding
                    // strings (spec.md §4.3): "@" takes id 0, "*" takes id 1,
                    // so "hello" is the third entry, id 2.
                    id: Some(2),
                },
                Event::EndTypedValues,
                Event::EndObject,
                Event::EndTypedValues,
            ]
        );
    }

    #[test]
    fn out_of_range_value_is_an_error() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"s");
        bytes.push(crate::head_byte::HEAD_INT_4BYTES);
        bytes.extend_from_slice(&70_000i32.to_le_bytes());
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        reader.next(); // BeginTypedValues
        assert!(matches!(
            reader.next(),
            Some(Err(Error::ValueOutOfRange { .. }))
        ));
    }

    #[test]
    fn forward_object_reference_is_an_error() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"@");
        bytes.extend_from_slice(&crate::head_byte::encode_reference(0));
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        reader.next(); // BeginTypedValues
        assert!(matches!(
            reader.next(),
            Some(Err(Error::UnknownReference { id: 0, .. }))
        ));
    }

    #[test]
    fn bitfield_value_is_unsupported() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"b4");
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        reader.next(); // BeginTypedValues
        assert!(matches!(reader.next(), Some(Err(Error::UnsupportedType(_)))));
    }

    #[test]
    fn clean_end_of_stream_after_a_full_group_is_not_an_error() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"i");
        bytes.push(42);
        let mut reader = StreamReader::new(&bytes);
        let events: Vec<_> = reader.by_ref().map(Result::unwrap).collect();
        assert_eq!(events.len(), 4); // Header, BeginTypedValues, Atom, EndTypedValues
        assert!(reader.next().is_none());
    }

    #[test]
    fn class_chain_ending_in_nil_before_any_class_is_malformed() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"@");
        bytes.push(HEAD_NEW); // begin object
        bytes.push(HEAD_NIL); // chain ends with no SingleClass link at all
        let mut reader = StreamReader::new(&bytes);
        reader.next(); // header
        reader.next(); // BeginTypedValues
        reader.next(); // BeginObject
        assert!(matches!(reader.next(), Some(Err(Error::MalformedHead { .. }))));
    }
}
