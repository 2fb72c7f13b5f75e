use std::sync::Arc;

use serde::ser::{self, Serialize};

use crate::error::Error;
use crate::value::{DictKind, Value, ValueMap, ValueRepr};

/// Transforms a serializable value into a [`Value`].
///
/// Serialization failures produce a string sentinel so that template
/// rendering surfaces them instead of panicking.
pub(crate) fn transform<T: Serialize + ?Sized>(value: &T) -> Value {
    match value.serialize(ValueSerializer) {
        Ok(rv) => rv,
        Err(err) => Value::from(format!("<serialization error: {err}>")),
    }
}

impl Serialize for Value {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: ser::Serializer,
    {
        match self.0 {
            ValueRepr::None | ValueRepr::Undefined(..) => serializer.serialize_unit(),
            ValueRepr::Bool(b) => serializer.serialize_bool(b),
            ValueRepr::Int(i) => serializer.serialize_i64(i),
            ValueRepr::Float(f) => serializer.serialize_f64(f),
            ValueRepr::String(ref s) | ValueRepr::Markup(ref s) => serializer.serialize_str(s),
            ValueRepr::List(ref items) => {
                use serde::ser::SerializeSeq;
                let mut seq = ok!(serializer.serialize_seq(Some(items.len())));
                for item in items.iter() {
                    ok!(seq.serialize_element(item));
                }
                seq.end()
            }
            ValueRepr::Dict(ref map, _) => {
                use serde::ser::SerializeMap;
                let mut m = ok!(serializer.serialize_map(Some(map.len())));
                for (key, value) in map.iter() {
                    ok!(m.serialize_entry(&key as &str, value));
                }
                m.end()
            }
            ValueRepr::Callable(ref c) => serializer.serialize_str(&c.to_string()),
            ValueRepr::Custom(ref c) => serializer.serialize_str(&format!("{}", DisplayObject(c))),
        }
    }
}

struct DisplayObject<'a>(&'a Arc<dyn crate::value::object::Object>);

impl std::fmt::Display for DisplayObject<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.render(f)
    }
}

struct ValueSerializer;

impl ser::Serializer for ValueSerializer {
    type Ok = Value;
    type Error = Error;

    type SerializeSeq = SerializeSeq;
    type SerializeTuple = SerializeSeq;
    type SerializeTupleStruct = SerializeSeq;
    type SerializeTupleVariant = SerializeTupleVariant;
    type SerializeMap = SerializeMap;
    type SerializeStruct = SerializeStruct;
    type SerializeStructVariant = SerializeStructVariant;

    fn serialize_bool(self, v: bool) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Bool(v)))
    }

    fn serialize_i8(self, v: i8) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Int(v as i64)))
    }

    fn serialize_i16(self, v: i16) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Int(v as i64)))
    }

    fn serialize_i32(self, v: i32) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Int(v as i64)))
    }

    fn serialize_i64(self, v: i64) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Int(v)))
    }

    fn serialize_u8(self, v: u8) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Int(v as i64)))
    }

    fn serialize_u16(self, v: u16) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Int(v as i64)))
    }

    fn serialize_u32(self, v: u32) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Int(v as i64)))
    }

    fn serialize_u64(self, v: u64) -> Result<Value, Error> {
        // values that do not fit the engine's signed integers degrade to
        // floats which matches the template facing number model.
        match i64::try_from(v) {
            Ok(v) => Ok(Value(ValueRepr::Int(v))),
            Err(_) => Ok(Value(ValueRepr::Float(v as f64))),
        }
    }

    fn serialize_f32(self, v: f32) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Float(v as f64)))
    }

    fn serialize_f64(self, v: f64) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Float(v)))
    }

    fn serialize_char(self, v: char) -> Result<Value, Error> {
        Ok(Value::from(v.to_string()))
    }

    fn serialize_str(self, value: &str) -> Result<Value, Error> {
        Ok(Value::from(value))
    }

    fn serialize_bytes(self, value: &[u8]) -> Result<Value, Error> {
        Ok(Value::from(String::from_utf8_lossy(value).into_owned()))
    }

    fn serialize_none(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_some<T>(self, value: &T) -> Result<Value, Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<Value, Error> {
        Ok(Value(ValueRepr::None))
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
    ) -> Result<Value, Error> {
        Ok(Value::from(variant))
    }

    fn serialize_newtype_struct<T>(self, _name: &'static str, value: &T) -> Result<Value, Error>
    where
        T: Serialize + ?Sized,
    {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T>(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        value: &T,
    ) -> Result<Value, Error>
    where
        T: Serialize + ?Sized,
    {
        let mut map = ValueMap::new();
        map.insert(Arc::from(variant), ok!(value.serialize(self)));
        Ok(Value::from_value_map(map))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq, Error> {
        Ok(SerializeSeq {
            elements: Vec::with_capacity(crate::utils::untrusted_size_hint(len.unwrap_or(0))),
        })
    }

    fn serialize_tuple(self, len: usize) -> Result<Self::SerializeTuple, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleStruct, Error> {
        self.serialize_seq(Some(len))
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        len: usize,
    ) -> Result<Self::SerializeTupleVariant, Error> {
        Ok(SerializeTupleVariant {
            name: variant,
            fields: Vec::with_capacity(crate::utils::untrusted_size_hint(len)),
        })
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap, Error> {
        Ok(SerializeMap {
            entries: ValueMap::new(),
            key: None,
        })
    }

    fn serialize_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct, Error> {
        Ok(SerializeStruct {
            fields: ValueMap::new(),
        })
    }

    fn serialize_struct_variant(
        self,
        _name: &'static str,
        _variant_index: u32,
        variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant, Error> {
        Ok(SerializeStructVariant {
            variant,
            map: ValueMap::new(),
        })
    }
}

struct SerializeSeq {
    elements: Vec<Value>,
}

impl ser::SerializeSeq for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.elements.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::List(Arc::new(self.elements))))
    }
}

impl ser::SerializeTuple for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_element<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, Error> {
        ser::SerializeSeq::end(self)
    }
}

impl ser::SerializeTupleStruct for SerializeSeq {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        ser::SerializeSeq::serialize_element(self, value)
    }

    fn end(self) -> Result<Value, Error> {
        ser::SerializeSeq::end(self)
    }
}

struct SerializeTupleVariant {
    name: &'static str,
    fields: Vec<Value>,
}

impl ser::SerializeTupleVariant for SerializeTupleVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.fields.push(ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut map = ValueMap::new();
        map.insert(
            Arc::from(self.name),
            Value(ValueRepr::List(Arc::new(self.fields))),
        );
        Ok(Value::from_value_map(map))
    }
}

struct SerializeMap {
    entries: ValueMap,
    key: Option<Arc<str>>,
}

impl ser::SerializeMap for SerializeMap {
    type Ok = Value;
    type Error = Error;

    fn serialize_key<T>(&mut self, key: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let key = ok!(key.serialize(ValueSerializer));
        self.key = Some(key.as_dict_key());
        Ok(())
    }

    fn serialize_value<T>(&mut self, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        let key = self.key.take().expect("serialize_key not called");
        self.entries.insert(key, ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value(ValueRepr::Dict(
            Arc::new(self.entries),
            DictKind::Normal,
        )))
    }
}

struct SerializeStruct {
    fields: ValueMap,
}

impl ser::SerializeStruct for SerializeStruct {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.fields
            .insert(Arc::from(key), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        Ok(Value::from_value_map(self.fields))
    }
}

struct SerializeStructVariant {
    variant: &'static str,
    map: ValueMap,
}

impl ser::SerializeStructVariant for SerializeStructVariant {
    type Ok = Value;
    type Error = Error;

    fn serialize_field<T>(&mut self, key: &'static str, value: &T) -> Result<(), Error>
    where
        T: Serialize + ?Sized,
    {
        self.map
            .insert(Arc::from(key), ok!(value.serialize(ValueSerializer)));
        Ok(())
    }

    fn end(self) -> Result<Value, Error> {
        let mut rv = ValueMap::new();
        rv.insert(Arc::from(self.variant), Value::from_value_map(self.map));
        Ok(Value::from_value_map(rv))
    }
}

#[cfg(test)]
mod tests {
    use crate::value::Value;

    use similar_asserts::assert_eq;

    #[test]
    fn test_basic_transform() {
        assert_eq!(Value::from_serializable(&42), Value::from(42));
        assert_eq!(Value::from_serializable(&"x"), Value::from("x"));
        assert_eq!(
            Value::from_serializable(&vec![1, 2, 3]),
            Value::from(vec![1, 2, 3])
        );
        assert_eq!(Value::from_serializable(&()), Value::from(()));
    }

    #[test]
    fn test_map_transform() {
        let mut map = std::collections::BTreeMap::new();
        map.insert("a", 1);
        let value = Value::from_serializable(&map);
        assert_eq!(value.get_attr("a"), Some(Value::from(1)));
    }
}
