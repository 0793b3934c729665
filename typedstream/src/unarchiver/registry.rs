/*!
 Dispatches a decoded object's class chain to a registered decoder
 (spec.md §6 "Class decoder registry").

 A decoder receives the object's resolved class chain (most-derived first)
 and its already-decoded field values, and returns the [`Value`] the
 unarchiver should substitute for the object. Classes with no registered
 decoder fall back to [`Value::Generic`], keeping the class chain and raw
 fields around rather than failing the whole decode (spec.md §6 "Unknown
 classes").
*/
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::events::Scalar;
use crate::unarchiver::value::{ClassChain, Value};

/// A class decoder: given the object's class chain and decoded fields,
/// produce the [`Value`] to substitute for it
pub type ClassDecoder = fn(&ClassChain, &[Value]) -> Result<Value>;

/// Maps class names to decoders, consulted in most-derived-first order
/// against the object's class chain
pub struct ClassRegistry {
    decoders: HashMap<String, ClassDecoder>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// A registry preloaded with decoders for the handful of Foundation
    /// classes spec.md §6 calls out as worth shipping a decoder for
    pub fn with_foundation_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("NSString", decode_string);
        registry.register("NSMutableString", decode_string);
        registry.register("NSArray", decode_array);
        registry.register("NSMutableArray", decode_array);
        registry.register("NSDictionary", decode_dictionary);
        registry.register("NSMutableDictionary", decode_dictionary);
        registry.register("NSNumber", decode_number);
        registry.register("NSData", decode_data);
        registry.register("NSMutableData", decode_data);
        registry.register("NSDate", decode_date);
        registry.register("NSObject", decode_generic_terminal);
        registry
    }

    /// Register (or replace) the decoder for a class name
    pub fn register(&mut self, class_name: &str, decoder: ClassDecoder) {
        self.decoders.insert(class_name.to_string(), decoder);
    }

    /// Find a decoder for the first name in `class_chain` that has one
    pub fn lookup(&self, class_chain: &ClassChain) -> Option<ClassDecoder> {
        class_chain
            .iter()
            .find_map(|link| self.decoders.get(link.name.as_str()))
            .copied()
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::with_foundation_defaults()
    }
}

fn class_name(class_chain: &ClassChain) -> &str {
    class_chain
        .first()
        .map(|link| link.name.as_str())
        .unwrap_or("?")
}

fn decode_string(class_chain: &ClassChain, fields: &[Value]) -> Result<Value> {
    match fields.first() {
        Some(Value::String(bytes)) => {
            let text = std::str::from_utf8(bytes)
                .map_err(Error::StringParseError)?
                .to_string();
            Ok(Value::Str(text))
        }
        _ => Err(Error::ClassDecoderFailed {
            class_name: class_name(class_chain).to_string(),
            underlying: Box::new(Error::UnsupportedType(
                "expected a c-string field".to_string(),
            )),
        }),
    }
}

fn decode_data(class_chain: &ClassChain, fields: &[Value]) -> Result<Value> {
    match fields.first() {
        Some(Value::String(bytes)) => Ok(Value::Data(bytes.clone())),
        _ => Err(Error::ClassDecoderFailed {
            class_name: class_name(class_chain).to_string(),
            underlying: Box::new(Error::UnsupportedType(
                "expected a c-string field".to_string(),
            )),
        }),
    }
}

fn decode_number(class_chain: &ClassChain, fields: &[Value]) -> Result<Value> {
    match fields.first() {
        Some(Value::Scalar(scalar)) => Ok(Value::Number(scalar.clone())),
        _ => Err(Error::ClassDecoderFailed {
            class_name: class_name(class_chain).to_string(),
            underlying: Box::new(Error::UnsupportedType(
                "expected a scalar field".to_string(),
            )),
        }),
    }
}

fn decode_date(class_chain: &ClassChain, fields: &[Value]) -> Result<Value> {
    match fields.first() {
        Some(Value::Scalar(Scalar::Double(seconds))) => Ok(Value::Date(*seconds)),
        Some(Value::Scalar(Scalar::Float(seconds))) => Ok(Value::Date(*seconds as f64)),
        _ => Err(Error::ClassDecoderFailed {
            class_name: class_name(class_chain).to_string(),
            underlying: Box::new(Error::UnsupportedType(
                "expected a floating-point field".to_string(),
            )),
        }),
    }
}

fn decode_array(_class_chain: &ClassChain, fields: &[Value]) -> Result<Value> {
    // First field is the element count; the rest are the elements themselves.
    Ok(Value::List(fields.iter().skip(1).cloned().collect()))
}

fn decode_dictionary(class_chain: &ClassChain, fields: &[Value]) -> Result<Value> {
    let rest = &fields[1.min(fields.len())..];
    if rest.len() % 2 != 0 {
        return Err(Error::ClassDecoderFailed {
            class_name: class_name(class_chain).to_string(),
            underlying: Box::new(Error::UnsupportedType(
                "expected an even number of key/value fields".to_string(),
            )),
        });
    }
    let pairs = rest
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()))
        .collect();
    Ok(Value::Dict(pairs))
}

fn decode_generic_terminal(class_chain: &ClassChain, fields: &[Value]) -> Result<Value> {
    Ok(Value::Generic {
        class_chain: class_chain.clone(),
        fields: fields.to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unarchiver::value::ClassLink;

    fn chain(name: &str) -> ClassChain {
        vec![ClassLink {
            name: name.to_string(),
            version: 0,
        }]
    }

    #[test]
    fn looks_up_by_most_derived_class_first() {
        let registry = ClassRegistry::with_foundation_defaults();
        let chain = vec![
            ClassLink {
                name: "NSMutableString".to_string(),
                version: 1,
            },
            ClassLink {
                name: "NSString".to_string(),
                version: 1,
            },
        ];
        assert!(registry.lookup(&chain).is_some());
    }

    #[test]
    fn unknown_class_has_no_decoder() {
        let registry = ClassRegistry::with_foundation_defaults();
        assert!(registry.lookup(&chain("MyCustomClass")).is_none());
    }

    #[test]
    fn decodes_nsstring_from_cstring_field() {
        let fields = vec![Value::String(b"hello".to_vec())];
        let result = decode_string(&chain("NSString"), &fields).unwrap();
        assert_eq!(result, Value::Str("hello".to_string()));
    }

    #[test]
    fn decodes_nsarray_skipping_count_field() {
        let fields = vec![
            Value::Scalar(Scalar::Unsigned(2)),
            Value::Str("a".to_string()),
            Value::Str("b".to_string()),
        ];
        let result = decode_array(&chain("NSArray"), &fields).unwrap();
        assert_eq!(
            result,
            Value::List(vec![Value::Str("a".to_string()), Value::Str("b".to_string())])
        );
    }

    #[test]
    fn decodes_nsdictionary_pairs() {
        let fields = vec![
            Value::Scalar(Scalar::Unsigned(1)),
            Value::Str("key".to_string()),
            Value::Str("value".to_string()),
        ];
        let result = decode_dictionary(&chain("NSDictionary"), &fields).unwrap();
        assert_eq!(
            result,
            Value::Dict(vec![(Value::Str("key".to_string()), Value::Str("value".to_string()))])
        );
    }
}
