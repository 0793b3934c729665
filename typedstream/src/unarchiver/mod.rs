/*!
 Reconstructs typed values and objects from the flat event stream
 (spec.md §5, §6 "Unarchiver").

 The [`Unarchiver`] drives a [`StreamReader`] and keeps its own reference
 tables for objects and classes, separate from the Stream Reader's: the
 Stream Reader only needs to know an id was seen before, while the
 Unarchiver needs the actual decoded value behind that id to preserve
 object identity (spec.md §3 "Object identity"). Cyclic object graphs are
 handled the way the teacher's parser handles them: a placeholder is
 reserved in the object table before an object's class chain and fields
 are read, so a reference encountered while the object is still being
 built resolves to that placeholder rather than failing outright.
*/
pub mod registry;
pub mod value;

use crate::error::{Error, Result};
use crate::events::Event;
use crate::reference_table::{Namespace, ReferenceTable};
use crate::stream_reader::StreamReader;
use crate::type_encoding::{is_compatible, TypeDescriptor};

pub use registry::{ClassDecoder, ClassRegistry};
pub use value::{ClassChain, ClassLink, Value};

/// Reconstructs a decoded value graph from a `typedstream` byte slice
pub struct Unarchiver<'a> {
    reader: StreamReader<'a>,
    lookahead: Option<Event>,
    header_read: bool,
    objects: ReferenceTable<Value>,
    classes: ReferenceTable<ClassLink>,
    registry: ClassRegistry,
}

impl<'a> Unarchiver<'a> {
    /// An unarchiver preloaded with decoders for the Foundation classes
    /// spec.md §6 calls out (`NSString`, `NSArray`, `NSDictionary`, ...)
    pub fn new(bytes: &'a [u8]) -> Self {
        Self::with_registry(bytes, ClassRegistry::with_foundation_defaults())
    }

    /// An unarchiver using a caller-supplied registry, for embedding custom
    /// or additional class decoders
    pub fn with_registry(bytes: &'a [u8], registry: ClassRegistry) -> Self {
        Self {
            reader: StreamReader::new(bytes),
            lookahead: None,
            header_read: false,
            objects: ReferenceTable::new(Namespace::Object),
            classes: ReferenceTable::new(Namespace::Class),
            registry,
        }
    }

    /// Register (or replace) a class decoder before decoding
    pub fn register(&mut self, class_name: &str, decoder: ClassDecoder) {
        self.registry.register(class_name, decoder);
    }

    fn pull(&mut self) -> Result<Option<Event>> {
        if let Some(event) = self.lookahead.take() {
            return Ok(Some(event));
        }
        self.reader.next().transpose()
    }

    fn peek(&mut self) -> Result<Option<&Event>> {
        if self.lookahead.is_none() {
            self.lookahead = self.reader.next().transpose()?;
        }
        Ok(self.lookahead.as_ref())
    }

    fn expect_next(&mut self) -> Result<Event> {
        self.pull()?.ok_or(Error::Truncated {
            offset: self.reader.position(),
            requested: 1,
            available: 0,
        })
    }

    fn ensure_header(&mut self) -> Result<()> {
        if self.header_read {
            return Ok(());
        }
        match self.expect_next()? {
            Event::Header { .. } => {
                self.header_read = true;
                Ok(())
            }
            other => Err(unexpected("stream header", other)),
        }
    }

    /// Decode every root-level value across every top-level typed-values
    /// group in the stream (spec.md §6 `decode_all`)
    pub fn decode_all(&mut self) -> Result<Vec<Value>> {
        self.ensure_header()?;
        let mut values = Vec::new();
        while self.peek()?.is_some() {
            values.append(&mut self.decode_typed_values_group()?);
        }
        Ok(values)
    }

    /// Decode exactly one top-level typed-values group, checking its
    /// declared encoding against `expected` (spec.md §4.6 type-compatibility
    /// rule)
    pub fn decode_typed_values(&mut self, expected: &[TypeDescriptor]) -> Result<Vec<Value>> {
        self.ensure_header()?;
        match self.expect_next()? {
            Event::BeginTypedValues(types) => {
                let compatible = types.len() == expected.len()
                    && types
                        .iter()
                        .zip(expected)
                        .all(|(actual, expected)| is_compatible(expected, actual));
                if !compatible {
                    return Err(Error::TypeMismatch {
                        expected: render_types(expected),
                        actual: render_types(&types),
                    });
                }
                let mut values = Vec::with_capacity(types.len());
                for descriptor in &types {
                    values.push(self.decode_value(descriptor)?);
                }
                self.expect_end_typed_values()?;
                Ok(values)
            }
            other => Err(unexpected("typed values group", other)),
        }
    }

    fn decode_typed_values_group(&mut self) -> Result<Vec<Value>> {
        match self.expect_next()? {
            Event::BeginTypedValues(types) => {
                let mut values = Vec::with_capacity(types.len());
                for descriptor in &types {
                    values.push(self.decode_value(descriptor)?);
                }
                self.expect_end_typed_values()?;
                Ok(values)
            }
            other => Err(unexpected("typed values group", other)),
        }
    }

    fn expect_end_typed_values(&mut self) -> Result<()> {
        match self.expect_next()? {
            Event::EndTypedValues => Ok(()),
            other => Err(unexpected("end of typed values", other)),
        }
    }

    fn decode_value(&mut self, descriptor: &TypeDescriptor) -> Result<Value> {
        match descriptor {
            TypeDescriptor::Primitive(_) => match self.expect_next()? {
                Event::Atom(scalar) => Ok(Value::Scalar(scalar)),
                other => Err(unexpected("scalar atom", other)),
            },
            TypeDescriptor::CString => match self.expect_next()? {
                Event::CString { value: Some(bytes), .. } => Ok(Value::String(bytes)),
                Event::CString { value: None, .. } => Ok(Value::Nil),
                other => Err(unexpected("c-string", other)),
            },
            TypeDescriptor::Selector => match self.expect_next()? {
                Event::Selector { value } => Ok(Value::Selector(value)),
                other => Err(unexpected("selector", other)),
            },
            TypeDescriptor::Object => self.decode_object(),
            TypeDescriptor::Class => self.decode_class_value(),
            TypeDescriptor::Array { count, element } => self.decode_array(*count, element),
            TypeDescriptor::Struct { name, fields } | TypeDescriptor::Union { name, fields } => {
                self.decode_struct(name, fields)
            }
            TypeDescriptor::Bitfield(_) | TypeDescriptor::Pointer(_) | TypeDescriptor::Unknown => {
                Err(Error::UnsupportedType(descriptor.to_string()))
            }
            TypeDescriptor::UnknownEncoding(_) => match self.expect_next()? {
                Event::UnsupportedAtom { encoding, raw } => Ok(Value::Unsupported { encoding, raw }),
                other => Err(unexpected("unsupported atom", other)),
            },
        }
    }

    fn decode_array(&mut self, count: u32, element: &TypeDescriptor) -> Result<Value> {
        match self.expect_next()? {
            Event::BeginArray { .. } => {}
            other => return Err(unexpected("array", other)),
        }
        let mut items = Vec::with_capacity(count as usize);
        for _ in 0..count {
            items.push(self.decode_value(element)?);
        }
        match self.expect_next()? {
            Event::EndArray => Ok(Value::Array(items)),
            other => Err(unexpected("end of array", other)),
        }
    }

    fn decode_struct(&mut self, name: &str, fields: &[TypeDescriptor]) -> Result<Value> {
        match self.expect_next()? {
            Event::BeginStruct { .. } => {}
            other => return Err(unexpected("struct", other)),
        }
        let mut values = Vec::with_capacity(fields.len());
        for field in fields {
            values.push(self.decode_value(field)?);
        }
        match self.expect_next()? {
            Event::EndStruct => Ok(Value::Struct {
                name: name.to_string(),
                fields: values,
            }),
            other => Err(unexpected("end of struct", other)),
        }
    }

    fn decode_class_value(&mut self) -> Result<Value> {
        match self.expect_next()? {
            Event::Nil => Ok(Value::Nil),
            Event::SingleClass { name, version, .. } => {
                let link = ClassLink {
                    name: String::from_utf8_lossy(&name).into_owned(),
                    version,
                };
                self.classes.intern(link.clone());
                Ok(Value::Class(link))
            }
            Event::ClassReference { id } => Ok(Value::Class(self.classes.resolve(id)?.clone())),
            other => Err(unexpected("class value", other)),
        }
    }

    /// Reads the chain of `SingleClass`/`ClassReference` events following an
    /// object's `BeginObject`, most-derived link first
    fn read_class_chain(&mut self) -> Result<ClassChain> {
        let mut chain = Vec::new();
        loop {
            match self.peek()? {
                Some(Event::SingleClass { .. }) | Some(Event::ClassReference { .. }) => {
                    match self.expect_next()? {
                        Event::SingleClass { name, version, .. } => {
                            let link = ClassLink {
                                name: String::from_utf8_lossy(&name).into_owned(),
                                version,
                            };
                            self.classes.intern(link.clone());
                            chain.push(link);
                        }
                        Event::ClassReference { id } => {
                            chain.push(self.classes.resolve(id)?.clone());
                            break;
                        }
                        other => return Err(unexpected("class chain link", other)),
                    }
                }
                _ => break,
            }
        }
        Ok(chain)
    }

    fn decode_object(&mut self) -> Result<Value> {
        match self.expect_next()? {
            Event::Nil => Ok(Value::Nil),
            Event::ObjectReference { id } => Ok(self.objects.resolve(id)?.clone()),
            Event::BeginObject { id } => {
                let placeholder_id = self.objects.intern(Value::Placeholder);
                debug_assert_eq!(placeholder_id, id, "object id sequencing diverged from the stream reader");

                let class_chain = self.read_class_chain()?;

                let mut fields = Vec::new();
                loop {
                    match self.peek()? {
                        Some(Event::EndObject) => {
                            self.pull()?;
                            break;
                        }
                        Some(_) => fields.append(&mut self.decode_typed_values_group()?),
                        None => {
                            return Err(Error::Truncated {
                                offset: self.reader.position(),
                                requested: 1,
                                available: 0,
                            })
                        }
                    }
                }

                let decoded = self.dispatch(&class_chain, fields)?;
                *self.objects.resolve_mut(placeholder_id)? = decoded.clone();
                Ok(decoded)
            }
            other => Err(unexpected("object", other)),
        }
    }

    fn dispatch(&self, class_chain: &ClassChain, fields: Vec<Value>) -> Result<Value> {
        match self.registry.lookup(class_chain) {
            Some(decoder) => {
                let decoded = decoder(class_chain, &fields).map_err(|why| Error::ClassDecoderFailed {
                    class_name: class_chain
                        .first()
                        .map(|link| link.name.clone())
                        .unwrap_or_default(),
                    underlying: Box::new(why),
                })?;
                Ok(Value::Object {
                    class_chain: class_chain.clone(),
                    decoded: Box::new(decoded),
                })
            }
            None => Ok(Value::Generic {
                class_chain: class_chain.clone(),
                fields,
            }),
        }
    }
}

fn unexpected(context: &str, found: Event) -> Error {
    Error::TypeMismatch {
        expected: context.to_string(),
        actual: format!("{found:?}"),
    }
}

fn render_types(types: &[TypeDescriptor]) -> String {
    types.iter().map(ToString::to_string).collect::<Vec<_>>().join("")
}

/// Decode the first root-level value in a `typedstream` byte slice
/// (spec.md §6 "Top-level API")
pub fn unarchive_from_bytes(bytes: &[u8]) -> Result<Value> {
    let mut values = unarchive_all(bytes)?;
    if values.is_empty() {
        return Err(Error::Truncated {
            offset: bytes.len(),
            requested: 1,
            available: 0,
        });
    }
    Ok(values.remove(0))
}

/// Decode every root-level value in a `typedstream` byte slice
pub fn unarchive_all(bytes: &[u8]) -> Result<Vec<Value>> {
    Unarchiver::new(bytes).decode_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Scalar;
    use crate::head_byte::{HEAD_END, HEAD_NEW, HEAD_NIL};

    const SIGNATURE: &[u8] = b"\x04\x0bstreamtyped";

    fn header_bytes() -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.push(4);
        bytes.push(0);
        bytes.push(1);
        bytes
    }

    fn push_new_cstring(bytes: &mut Vec<u8>, s: &[u8]) {
        bytes.push(HEAD_NEW);
        bytes.push(s.len() as u8);
        bytes.extend_from_slice(s);
    }

    #[test]
    fn decodes_top_level_int() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"i");
        bytes.push(42);
        let values = unarchive_all(&bytes).unwrap();
        assert_eq!(values, vec![Value::Scalar(Scalar::Signed(42))]);
    }

    #[test]
    fn decodes_nsstring_object() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"@");
        bytes.push(HEAD_NEW); // begin object
        bytes.push(HEAD_NEW); // begin class
        bytes.push(8);
        bytes.extend_from_slice(b"NSString");
        bytes.push(0);
        bytes.push(HEAD_NIL); // end of chain
        push_new_cstring(&mut bytes, b"*");
        bytes.push(HEAD_NEW);
        bytes.push(5);
        bytes.extend_from_slice(b"hello");
        bytes.push(HEAD_END); // end object

        let value = unarchive_from_bytes(&bytes).unwrap();
        let Value::Object { class_chain, decoded } = value else {
            panic!("expected an Object value, got {value:?}");
        };
        assert_eq!(class_chain[0].name, "NSString");
        assert_eq!(decoded.as_str(), Some("hello"));
    }

    #[test]
    fn unknown_class_falls_back_to_generic() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"@");
        bytes.push(HEAD_NEW);
        bytes.push(HEAD_NEW);
        bytes.push(11);
        bytes.extend_from_slice(b"MyCustomFoo");
        bytes.push(0);
        bytes.push(HEAD_NIL);
        push_new_cstring(&mut bytes, b"i");
        bytes.push(7);
        bytes.push(HEAD_END);

        let value = unarchive_from_bytes(&bytes).unwrap();
        assert_eq!(
            value,
            Value::Generic {
                class_chain: vec![ClassLink {
                    name: "MyCustomFoo".to_string(),
                    version: 0
                }],
                fields: vec![Value::Scalar(Scalar::Signed(7))],
            }
        );
    }

    #[test]
    fn repeated_object_reference_preserves_identity() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"@@");
        bytes.push(HEAD_NEW);
        bytes.push(HEAD_NEW);
        bytes.push(8);
        bytes.extend_from_slice(b"NSObject");
        bytes.push(0);
        bytes.push(HEAD_NIL);
        bytes.push(HEAD_END);
        bytes.extend_from_slice(&crate::head_byte::encode_reference(0));

        let values = unarchive_all(&bytes).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], values[1]);
    }

    #[test]
    fn type_mismatch_against_expected_encoding_is_an_error() {
        let mut bytes = header_bytes();
        push_new_cstring(&mut bytes, b"i");
        bytes.push(1);
        let mut unarchiver = Unarchiver::new(&bytes);
        let expected = vec![TypeDescriptor::Object];
        assert!(matches!(
            unarchiver.decode_typed_values(&expected),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn decode_all_reports_truncation_right_after_the_header() {
        // header only, no values at all (spec.md §8 scenario 6)
        let bytes = header_bytes();
        assert!(matches!(unarchive_all(&bytes), Err(Error::Truncated { .. })));
    }
}
