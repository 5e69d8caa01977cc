//! Field and method descriptors, and generic signatures.
//!
//! Descriptors are parsed strictly since the JVM verifies them. Signatures
//! are advisory metadata that compilers and obfuscators get wrong often
//! enough that parsing them is best effort.

use super::ClassFormatError;

/// Maximum nesting of type arguments followed in a signature
const MAX_SIGNATURE_DEPTH: usize = 64;

/// Class types named by a field or method descriptor, arrays unwrapped
pub fn descriptor_types(descriptor: &str) -> Result<Vec<String>, ClassFormatError> {
    let bad = || ClassFormatError::BadDescriptor(descriptor.to_string());
    let bytes = descriptor.as_bytes();
    let mut types = Vec::new();
    let mut pos = 0;

    if bytes.first() == Some(&b'(') {
        pos = 1;
        while bytes.get(pos) != Some(&b')') {
            if pos >= bytes.len() {
                return Err(bad());
            }
            pos = field_type(descriptor, pos, &mut types).ok_or_else(bad)?;
        }
        pos += 1;
        if bytes.get(pos) == Some(&b'V') {
            pos += 1;
        } else {
            pos = field_type(descriptor, pos, &mut types).ok_or_else(bad)?;
        }
    } else {
        pos = field_type(descriptor, pos, &mut types).ok_or_else(bad)?;
    }

    if pos != bytes.len() {
        return Err(bad());
    }
    Ok(types)
}

/// Like [`descriptor_types`] but also accepts `V`, as annotation class values do
pub fn return_descriptor_types(descriptor: &str) -> Result<Vec<String>, ClassFormatError> {
    if descriptor == "V" {
        Ok(Vec::new())
    } else {
        descriptor_types(descriptor)
    }
}

/// Parse one field type starting at `pos`, returning the position after it
fn field_type(descriptor: &str, mut pos: usize, types: &mut Vec<String>) -> Option<usize> {
    let bytes = descriptor.as_bytes();
    while bytes.get(pos) == Some(&b'[') {
        pos += 1;
    }

    match bytes.get(pos)? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => Some(pos + 1),
        b'L' => {
            let end = pos + descriptor[pos..].find(';')?;
            let name = &descriptor[pos + 1..end];
            if name.is_empty() {
                return None;
            }
            types.push(name.to_string());
            Some(end + 1)
        }
        _ => None,
    }
}

/// Class types named by a class, method or field signature
///
/// Returns `None` when the signature does not parse. Inner class types
/// written as `LOuter<..>.Inner;` produce both `Outer` and `Outer$Inner`.
pub fn signature_types(signature: &str) -> Option<Vec<String>> {
    let mut parser = SignatureParser {
        text: signature,
        pos: 0,
        depth: 0,
        types: Vec::new(),
    };
    parser.signature()?;
    Some(parser.types)
}

struct SignatureParser<'a> {
    text: &'a str,
    pos: usize,
    depth: usize,
    types: Vec<String>,
}

impl<'a> SignatureParser<'a> {
    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        if self.peek()? == byte {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }

    fn signature(&mut self) -> Option<()> {
        if self.peek()? == b'<' {
            self.type_parameters()?;
        }

        if self.peek()? == b'(' {
            self.pos += 1;
            while self.peek()? != b')' {
                self.java_type()?;
            }
            self.pos += 1;
            if self.peek()? == b'V' {
                self.pos += 1;
            } else {
                self.java_type()?;
            }
            while self.peek() == Some(b'^') {
                self.pos += 1;
                self.reference_type()?;
            }
        } else {
            // Class signature (superclass then interfaces) or field signature
            while self.peek().is_some() {
                self.reference_type()?;
            }
        }

        (self.pos == self.text.len()).then_some(())
    }

    fn type_parameters(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            self.identifier()?;
            self.expect(b':')?;
            // Class bound may be empty when only interface bounds exist
            if !matches!(self.peek()?, b':' | b'>') && !self.starts_parameter() {
                self.reference_type()?;
            }
            while self.peek()? == b':' {
                self.pos += 1;
                self.reference_type()?;
            }
        }
        self.pos += 1;
        Some(())
    }

    /// Whether the next token begins another type parameter rather than a bound
    fn starts_parameter(&self) -> bool {
        !matches!(self.peek(), Some(b'L' | b'T' | b'['))
    }

    fn java_type(&mut self) -> Option<()> {
        match self.peek()? {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => {
                self.pos += 1;
                Some(())
            }
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Option<()> {
        self.depth += 1;
        if self.depth > MAX_SIGNATURE_DEPTH {
            return None;
        }

        let result = match self.peek()? {
            b'L' => self.class_type(),
            b'T' => {
                self.pos += 1;
                self.identifier()?;
                self.expect(b';')
            }
            b'[' => {
                self.pos += 1;
                self.java_type()
            }
            _ => None,
        };

        self.depth -= 1;
        result
    }

    fn class_type(&mut self) -> Option<()> {
        self.expect(b'L')?;
        let start = self.pos;
        while !matches!(self.peek()?, b';' | b'<' | b'.') {
            self.pos += 1;
        }
        let mut name = self.text[start..self.pos].to_string();
        if name.is_empty() {
            return None;
        }
        self.types.push(name.clone());

        loop {
            match self.peek()? {
                b'<' => self.type_arguments()?,
                b'.' => {
                    self.pos += 1;
                    let inner = self.identifier()?;
                    name = format!("{}${}", name, inner);
                    self.types.push(name.clone());
                }
                b';' => {
                    self.pos += 1;
                    return Some(());
                }
                _ => return None,
            }
        }
    }

    fn type_arguments(&mut self) -> Option<()> {
        self.expect(b'<')?;
        while self.peek()? != b'>' {
            match self.peek()? {
                b'*' => self.pos += 1,
                b'+' | b'-' => {
                    self.pos += 1;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.pos += 1;
        Some(())
    }

    fn identifier(&mut self) -> Option<&'a str> {
        let start = self.pos;
        while !matches!(self.peek()?, b'.' | b';' | b'[' | b'/' | b'<' | b'>' | b':') {
            self.pos += 1;
        }
        let text: &'a str = self.text;
        (self.pos > start).then(|| &text[start..self.pos])
    }
}
