use super::reader::ClassReader;
use super::ClassFormatError;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Constant {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    String(u16),
    /// Field, method or interface method reference
    Member { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    /// `CONSTANT_Dynamic` and `CONSTANT_InvokeDynamic`
    Dynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
    /// Slot 0 and the slot following a long or double
    Unusable,
}

#[derive(Debug, Clone)]
pub(crate) struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn parse(reader: &mut ClassReader<'_>) -> Result<Self, ClassFormatError> {
        let count = reader.u16()?;
        let mut entries = Vec::with_capacity(count as usize);
        entries.push(Constant::Unusable);

        let mut index = 1u16;
        while index < count {
            let tag = reader.u8()?;
            let constant = match tag {
                TAG_UTF8 => {
                    let len = reader.u16()? as usize;
                    let bytes = reader.bytes(len)?;
                    Constant::Utf8(
                        decode_modified_utf8(bytes).ok_or(ClassFormatError::InvalidUtf8 { index })?,
                    )
                }
                TAG_INTEGER => Constant::Integer(reader.u32()? as i32),
                TAG_FLOAT => Constant::Float(f32::from_bits(reader.u32()?)),
                TAG_LONG => {
                    let high = u64::from(reader.u32()?);
                    let low = u64::from(reader.u32()?);
                    Constant::Long(((high << 32) | low) as i64)
                }
                TAG_DOUBLE => {
                    let high = u64::from(reader.u32()?);
                    let low = u64::from(reader.u32()?);
                    Constant::Double(f64::from_bits((high << 32) | low))
                }
                TAG_CLASS => Constant::Class(reader.u16()?),
                TAG_STRING => Constant::String(reader.u16()?),
                TAG_FIELDREF | TAG_METHODREF | TAG_INTERFACE_METHODREF => Constant::Member {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                TAG_NAME_AND_TYPE => Constant::NameAndType {
                    name: reader.u16()?,
                    descriptor: reader.u16()?,
                },
                TAG_METHOD_HANDLE => Constant::MethodHandle {
                    kind: reader.u8()?,
                    reference: reader.u16()?,
                },
                TAG_METHOD_TYPE => Constant::MethodType(reader.u16()?),
                TAG_DYNAMIC | TAG_INVOKE_DYNAMIC => Constant::Dynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                TAG_MODULE => Constant::Module(reader.u16()?),
                TAG_PACKAGE => Constant::Package(reader.u16()?),
                tag => return Err(ClassFormatError::BadConstantTag { index, tag }),
            };

            let wide = matches!(constant, Constant::Long(_) | Constant::Double(_));
            entries.push(constant);
            index += 1;
            if wide {
                // Longs and doubles take two slots
                if index >= count {
                    return Err(ClassFormatError::BadConstantIndex {
                        index: index - 1,
                        expected: "single-slot",
                    });
                }
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        let pool = Self { entries };
        pool.validate()?;
        Ok(pool)
    }

    /// Check that every cross-reference points at an entry of the right type
    fn validate(&self) -> Result<(), ClassFormatError> {
        for constant in &self.entries {
            match *constant {
                Constant::Class(name)
                | Constant::MethodType(name)
                | Constant::Module(name)
                | Constant::Package(name)
                | Constant::String(name) => {
                    self.utf8(name)?;
                }
                Constant::Member {
                    class,
                    name_and_type,
                } => {
                    self.class_name(class)?;
                    self.name_and_type(name_and_type)?;
                }
                Constant::NameAndType { name, descriptor } => {
                    self.utf8(name)?;
                    self.utf8(descriptor)?;
                }
                Constant::MethodHandle { reference, .. } => match self.get(reference) {
                    Some(Constant::Member { .. }) => {}
                    _ => {
                        return Err(ClassFormatError::BadConstantIndex {
                            index: reference,
                            expected: "member reference",
                        })
                    }
                },
                Constant::Dynamic { name_and_type, .. } => {
                    self.name_and_type(name_and_type)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn get(&self, index: u16) -> Option<&Constant> {
        self.entries.get(index as usize)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.entries.iter()
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.get(index) {
            Some(Constant::Utf8(value)) => Ok(value),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "Utf8",
            }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.get(index) {
            Some(Constant::Class(name)) => self.utf8(*name),
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "Class",
            }),
        }
    }

    /// Name and descriptor of a NameAndType entry
    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFormatError> {
        match self.get(index) {
            Some(Constant::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(ClassFormatError::BadConstantIndex {
                index,
                expected: "NameAndType",
            }),
        }
    }
}

/// Decode the JVM's modified UTF-8
///
/// NUL is encoded in two bytes and supplementary characters as surrogate
/// pairs of three-byte sequences, so decoding goes through UTF-16 units.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if let Ok(ascii) = std::str::from_utf8(bytes) {
        if ascii.bytes().all(|b| b != 0 && b < 0x80) {
            return Some(ascii.to_string());
        }
    }

    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match b {
            0x01..=0x7F => {
                units.push(u16::from(b));
                i += 1;
            }
            0xC0..=0xDF => {
                let b2 = continuation(bytes.get(i + 1))?;
                units.push((u16::from(b & 0x1F) << 6) | b2);
                i += 2;
            }
            0xE0..=0xEF => {
                let b2 = continuation(bytes.get(i + 1))?;
                let b3 = continuation(bytes.get(i + 2))?;
                units.push((u16::from(b & 0x0F) << 12) | (b2 << 6) | b3);
                i += 3;
            }
            _ => return None,
        }
    }

    // Unpaired surrogates cannot name anything in the archive
    Some(String::from_utf16_lossy(&units))
}

fn continuation(byte: Option<&u8>) -> Option<u16> {
    match byte {
        Some(&b) if b & 0xC0 == 0x80 => Some(u16::from(b & 0x3F)),
        _ => None,
    }
}
