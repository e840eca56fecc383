//! Datatypes and dataspaces in the JSON shapes the service speaks.

use serde_json::{Value, json};

use crate::error::{ProtocolError, RestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    fn suffix(&self) -> &'static str {
        match self {
            ByteOrder::Little => "LE",
            ByteOrder::Big => "BE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharSet {
    Ascii,
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrLength {
    Variable,
    Fixed(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Datatype {
    Integer {
        size: u8,
        signed: bool,
        order: ByteOrder,
    },
    Float {
        size: u8,
        order: ByteOrder,
    },
    String {
        length: StrLength,
        charset: CharSet,
    },
}

impl Datatype {
    pub fn native_i32() -> Self {
        Datatype::Integer {
            size: 4,
            signed: true,
            order: ByteOrder::Little,
        }
    }

    pub fn native_f64() -> Self {
        Datatype::Float {
            size: 8,
            order: ByteOrder::Little,
        }
    }

    pub fn to_json(&self) -> Result<Value> {
        match self {
            Datatype::Integer {
                size,
                signed,
                order,
            } => {
                if ![1, 2, 4, 8].contains(size) {
                    return Err(RestError::Argument(format!(
                        "unsupported integer size {size}"
                    )));
                }
                let base = format!(
                    "H5T_STD_{}{}{}",
                    if *signed { "I" } else { "U" },
                    u32::from(*size) * 8,
                    order.suffix()
                );
                Ok(json!({"class": "H5T_INTEGER", "base": base}))
            }
            Datatype::Float { size, order } => {
                if ![4, 8].contains(size) {
                    return Err(RestError::Argument(format!(
                        "unsupported floating-point size {size}"
                    )));
                }
                let base = format!("H5T_IEEE_F{}{}", u32::from(*size) * 8, order.suffix());
                Ok(json!({"class": "H5T_FLOAT", "base": base}))
            }
            Datatype::String { length, charset } => {
                let char_set = match charset {
                    CharSet::Ascii => "H5T_CSET_ASCII",
                    CharSet::Utf8 => "H5T_CSET_UTF8",
                };
                Ok(match length {
                    StrLength::Variable => json!({
                        "class": "H5T_STRING",
                        "charSet": char_set,
                        "strPad": "H5T_STR_NULLTERM",
                        "length": "H5T_VARIABLE",
                    }),
                    StrLength::Fixed(n) => json!({
                        "class": "H5T_STRING",
                        "charSet": char_set,
                        "strPad": "H5T_STR_NULLPAD",
                        "length": n,
                    }),
                })
            }
        }
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json()?)?)
    }

    /// Reads the value stored under a `type` key, or a bare predefined name such as
    /// `"H5T_STD_I32LE"`.
    pub fn from_json(value: &Value) -> Result<Self> {
        if let Some(base) = value.as_str() {
            return Self::from_base(base);
        }
        let class = str_field(value, "type.class", "class")?;
        match class {
            "H5T_INTEGER" | "H5T_FLOAT" => Self::from_base(str_field(value, "type.base", "base")?),
            "H5T_STRING" => {
                let charset = match str_field(value, "type.charSet", "charSet")? {
                    "H5T_CSET_ASCII" => CharSet::Ascii,
                    "H5T_CSET_UTF8" => CharSet::Utf8,
                    other => return Err(out_of_range("type.charSet", other)),
                };
                let length = match value.get("length") {
                    Some(Value::String(s)) if s == "H5T_VARIABLE" => StrLength::Variable,
                    Some(Value::Number(n)) => n
                        .as_u64()
                        .map(StrLength::Fixed)
                        .ok_or_else(|| out_of_range("type.length", &n.to_string()))?,
                    Some(_) => {
                        return Err(ProtocolError::WrongType {
                            key: "type.length".to_string(),
                            expected: "an integer or \"H5T_VARIABLE\"",
                        }
                        .into());
                    }
                    None => return Err(ProtocolError::MissingKey("type.length".to_string()).into()),
                };
                Ok(Datatype::String { length, charset })
            }
            other => Err(RestError::Unsupported(format!("datatype class {other}"))),
        }
    }

    fn from_base(base: &str) -> Result<Self> {
        let (body, order) = if let Some(b) = base.strip_suffix("LE") {
            (b, ByteOrder::Little)
        } else if let Some(b) = base.strip_suffix("BE") {
            (b, ByteOrder::Big)
        } else {
            return Err(out_of_range("type.base", base));
        };

        let bits_to_size = |bits: &str| -> Result<u8> {
            match bits {
                "8" => Ok(1),
                "16" => Ok(2),
                "32" => Ok(4),
                "64" => Ok(8),
                _ => Err(out_of_range("type.base", base)),
            }
        };

        if let Some(bits) = body.strip_prefix("H5T_STD_I") {
            Ok(Datatype::Integer {
                size: bits_to_size(bits)?,
                signed: true,
                order,
            })
        } else if let Some(bits) = body.strip_prefix("H5T_STD_U") {
            Ok(Datatype::Integer {
                size: bits_to_size(bits)?,
                signed: false,
                order,
            })
        } else if let Some(bits) = body.strip_prefix("H5T_IEEE_F") {
            let size = bits_to_size(bits)?;
            if size < 4 {
                return Err(out_of_range("type.base", base));
            }
            Ok(Datatype::Float { size, order })
        } else {
            Err(out_of_range("type.base", base))
        }
    }
}

fn out_of_range(key: &str, value: &str) -> RestError {
    ProtocolError::OutOfRange {
        key: key.to_string(),
        reason: format!("has unrecognised value '{value}'"),
    }
    .into()
}

fn str_field<'a>(value: &'a Value, key_path: &str, key: &str) -> Result<&'a str> {
    match value.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(ProtocolError::WrongType {
            key: key_path.to_string(),
            expected: "a string",
        }
        .into()),
        None => Err(ProtocolError::MissingKey(key_path.to_string()).into()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dataspace {
    Scalar,
    Null,
    /// `None` in `maxdims` marks an unlimited dimension.
    Simple {
        dims: Vec<u64>,
        maxdims: Option<Vec<Option<u64>>>,
    },
}

impl Dataspace {
    pub fn simple(dims: &[u64]) -> Self {
        Dataspace::Simple {
            dims: dims.to_vec(),
            maxdims: None,
        }
    }

    /// The `, "shape": ...` (and `, "maxdims": ...`) fragment appended after a body's
    /// `"type"` entry. Scalar spaces send nothing.
    pub fn shape_fragment(&self) -> Result<String> {
        match self {
            Dataspace::Scalar => Ok(String::new()),
            Dataspace::Null => Ok(r#", "shape": "H5S_NULL""#.to_string()),
            Dataspace::Simple { dims, maxdims } => {
                if dims.is_empty() {
                    return Err(RestError::Argument("0-dimension dataspace".to_string()));
                }
                let mut fragment = format!(", \"shape\": {}", serde_json::to_string(dims)?);
                if let Some(maxdims) = maxdims {
                    if maxdims.len() != dims.len() {
                        return Err(RestError::Argument(format!(
                            "dataspace has {} dimensions but {} maximum sizes",
                            dims.len(),
                            maxdims.len()
                        )));
                    }
                    // 0 is how the service spells "unlimited".
                    let wire: Vec<u64> = maxdims.iter().map(|m| m.unwrap_or(0)).collect();
                    fragment.push_str(&format!(", \"maxdims\": {}", serde_json::to_string(&wire)?));
                }
                Ok(fragment)
            }
        }
    }

    /// Reads the object stored under a `shape` key.
    pub fn from_json(shape: &Value) -> Result<Self> {
        match str_field(shape, "shape.class", "class")? {
            "H5S_NULL" => Ok(Dataspace::Null),
            "H5S_SCALAR" => Ok(Dataspace::Scalar),
            "H5S_SIMPLE" => {
                let dims = u64_array(shape, "dims")?.ok_or_else(|| {
                    RestError::from(ProtocolError::MissingKey("shape.dims".to_string()))
                })?;
                if dims.is_empty() {
                    return Err(ProtocolError::OutOfRange {
                        key: "shape.dims".to_string(),
                        reason: "is empty".to_string(),
                    }
                    .into());
                }
                let maxdims = u64_array(shape, "maxdims")?
                    .map(|m| m.into_iter().map(|v| (v != 0).then_some(v)).collect());
                Ok(Dataspace::Simple { dims, maxdims })
            }
            other => Err(out_of_range("shape.class", other)),
        }
    }
}

fn u64_array(value: &Value, key: &str) -> Result<Option<Vec<u64>>> {
    let key_path = format!("shape.{key}");
    let Some(raw) = value.get(key) else {
        return Ok(None);
    };
    let items = raw.as_array().ok_or_else(|| ProtocolError::WrongType {
        key: key_path.clone(),
        expected: "an array",
    })?;
    items
        .iter()
        .map(|v| {
            v.as_u64().ok_or_else(|| {
                RestError::from(ProtocolError::OutOfRange {
                    key: key_path.clone(),
                    reason: "holds a negative or non-integer size".to_string(),
                })
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Some)
}
