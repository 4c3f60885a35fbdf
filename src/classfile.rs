//! A read-only view of a JVM class file, limited to what classification
//! needs: names, supertypes, methods with their `throws` clauses,
//! annotations, invoke call sites and monitor usage.

use thiserror::Error;

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_BRIDGE: u16 = 0x0040;
pub const ACC_NATIVE: u16 = 0x0100;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;

const OP_INVOKEVIRTUAL: u8 = 0xb6;
const OP_INVOKESPECIAL: u8 = 0xb7;
const OP_INVOKESTATIC: u8 = 0xb8;
const OP_INVOKEINTERFACE: u8 = 0xb9;
const OP_TABLESWITCH: u8 = 0xaa;
const OP_LOOKUPSWITCH: u8 = 0xab;
const OP_MONITORENTER: u8 = 0xc2;
const OP_WIDE: u8 = 0xc4;
const OP_IINC: u8 = 0x84;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassFileError {
    #[error("not a class file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unexpected end of class file at offset {0}")]
    Truncated(usize),
    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownConstant { tag: u8, index: u16 },
    #[error("constant pool index {0} does not point to the expected entry")]
    BadConstantRef(u16),
    #[error("unknown opcode {opcode:#04x} at code offset {offset}")]
    BadOpcode { opcode: u8, offset: usize },
    #[error("{0} trailing bytes after class file")]
    TrailingBytes(usize),
    #[error("constant pool entry {0} is not valid modified UTF-8")]
    BadUtf8(u16),
}

type ParseResult<T> = std::result::Result<T, ClassFileError>;

/// A method or interface-method reference resolved from the constant pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    pub target: MemberRef,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub exceptions: Vec<String>,
    pub annotations: Vec<String>,
    pub calls: Vec<CallSite>,
    pub has_code: bool,
    pub uses_monitorenter: bool,
}

impl MethodInfo {
    pub fn is_abstract(&self) -> bool {
        self.access & ACC_ABSTRACT != 0
    }

    pub fn is_native(&self) -> bool {
        self.access & ACC_NATIVE != 0
    }

    pub fn is_synchronized(&self) -> bool {
        self.access & ACC_SYNCHRONIZED != 0
    }

    pub fn is_bridge(&self) -> bool {
        self.access & ACC_BRIDGE != 0
    }

    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    pub fn has_annotation(&self, descriptor: &str) -> bool {
        self.annotations.iter().any(|a| a == descriptor)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub methods: Vec<MethodInfo>,
    pub annotations: Vec<String>,
}

impl ClassFile {
    pub fn parse(bytes: &[u8]) -> ParseResult<Self> {
        let mut r = Reader::new(bytes);
        let magic = r.u4()?;
        if magic != MAGIC {
            return Err(ClassFileError::BadMagic(magic));
        }
        let minor_version = r.u2()?;
        let major_version = r.u2()?;
        let pool = ConstantPool::read(&mut r)?;

        let access = r.u2()?;
        let name = pool.class_name(r.u2()?)?;
        let super_index = r.u2()?;
        let super_name = if super_index == 0 {
            None
        } else {
            Some(pool.class_name(super_index)?)
        };
        let interface_count = r.u2()?;
        let mut interfaces = Vec::with_capacity(interface_count as usize);
        for _ in 0..interface_count {
            interfaces.push(pool.class_name(r.u2()?)?);
        }

        let field_count = r.u2()?;
        for _ in 0..field_count {
            r.skip(6)?;
            skip_attributes(&mut r)?;
        }

        let method_count = r.u2()?;
        let mut methods = Vec::with_capacity(method_count as usize);
        for _ in 0..method_count {
            methods.push(read_method(&mut r, &pool)?);
        }

        let mut annotations = Vec::new();
        let attribute_count = r.u2()?;
        for _ in 0..attribute_count {
            let attr_name = pool.utf8(r.u2()?)?;
            let len = r.u4()? as usize;
            let body = r.take(len)?;
            if is_annotations_attribute(attr_name) {
                annotations.extend(read_annotations(body, &pool)?);
            }
        }

        if r.remaining() > 0 {
            return Err(ClassFileError::TrailingBytes(r.remaining()));
        }

        Ok(Self {
            minor_version,
            major_version,
            access,
            name,
            super_name,
            interfaces,
            methods,
            annotations,
        })
    }

    pub fn is_interface(&self) -> bool {
        self.access & ACC_INTERFACE != 0
    }

    pub fn has_annotation(&self, descriptor: &str) -> bool {
        self.annotations.iter().any(|a| a == descriptor)
    }
}

fn read_method(r: &mut Reader<'_>, pool: &ConstantPool) -> ParseResult<MethodInfo> {
    let access = r.u2()?;
    let name = pool.utf8(r.u2()?)?.to_string();
    let descriptor = pool.utf8(r.u2()?)?.to_string();
    let mut method = MethodInfo {
        access,
        name,
        descriptor,
        exceptions: Vec::new(),
        annotations: Vec::new(),
        calls: Vec::new(),
        has_code: false,
        uses_monitorenter: false,
    };

    let attribute_count = r.u2()?;
    for _ in 0..attribute_count {
        let attr_name = pool.utf8(r.u2()?)?;
        let len = r.u4()? as usize;
        let body = r.take(len)?;
        match attr_name {
            "Code" => {
                method.has_code = true;
                read_code(body, pool, &mut method)?;
            }
            "Exceptions" => {
                let mut a = Reader::new(body);
                let count = a.u2()?;
                for _ in 0..count {
                    method.exceptions.push(pool.class_name(a.u2()?)?);
                }
            }
            name if is_annotations_attribute(name) => {
                method.annotations.extend(read_annotations(body, pool)?);
            }
            _ => {}
        }
    }
    Ok(method)
}

fn read_code(body: &[u8], pool: &ConstantPool, method: &mut MethodInfo) -> ParseResult<()> {
    let mut r = Reader::new(body);
    r.skip(4)?;
    let code_len = r.u4()? as usize;
    let code = r.take(code_len)?;

    let mut pc = 0usize;
    while pc < code.len() {
        let opcode = code[pc];
        match opcode {
            OP_INVOKEVIRTUAL | OP_INVOKESPECIAL | OP_INVOKESTATIC | OP_INVOKEINTERFACE => {
                let index = operand_u2(code, pc + 1)?;
                method.calls.push(CallSite {
                    target: pool.member_ref(index)?,
                    offset: pc,
                });
            }
            OP_MONITORENTER => method.uses_monitorenter = true,
            _ => {}
        }
        pc += instruction_length(code, pc)?;
    }
    if pc != code.len() {
        return Err(ClassFileError::Truncated(pc));
    }

    let handlers = r.u2()? as usize;
    r.skip(handlers * 8)?;
    skip_attributes(&mut r)
}

fn operand_u2(code: &[u8], at: usize) -> ParseResult<u16> {
    match code.get(at..at + 2) {
        Some(b) => Ok(u16::from_be_bytes([b[0], b[1]])),
        None => Err(ClassFileError::Truncated(at)),
    }
}

fn operand_i32(code: &[u8], at: usize) -> ParseResult<i32> {
    match code.get(at..at + 4) {
        Some(b) => Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => Err(ClassFileError::Truncated(at)),
    }
}

fn instruction_length(code: &[u8], pc: usize) -> ParseResult<usize> {
    let opcode = code[pc];
    let len = match opcode {
        0x00..=0x0f => 1,
        0x10 => 2,
        0x11 => 3,
        0x12 => 2,
        0x13 | 0x14 => 3,
        0x15..=0x19 => 2,
        0x1a..=0x35 => 1,
        0x36..=0x3a => 2,
        0x3b..=0x83 => 1,
        OP_IINC => 3,
        0x85..=0x98 => 1,
        0x99..=0xa8 => 3,
        0xa9 => 2,
        OP_TABLESWITCH => {
            let base = pc + 1 + switch_padding(pc);
            let low = operand_i32(code, base + 4)?;
            let high = operand_i32(code, base + 8)?;
            let cases = i64::from(high) - i64::from(low) + 1;
            if cases < 0 {
                return Err(ClassFileError::BadOpcode { opcode, offset: pc });
            }
            base - pc + 12 + cases as usize * 4
        }
        OP_LOOKUPSWITCH => {
            let base = pc + 1 + switch_padding(pc);
            let pairs = operand_i32(code, base + 4)?;
            if pairs < 0 {
                return Err(ClassFileError::BadOpcode { opcode, offset: pc });
            }
            base - pc + 8 + pairs as usize * 8
        }
        0xac..=0xb1 => 1,
        0xb2..=0xb8 => 3,
        0xb9 | 0xba => 5,
        0xbb => 3,
        0xbc => 2,
        0xbd => 3,
        0xbe | 0xbf => 1,
        0xc0 | 0xc1 => 3,
        0xc2 | 0xc3 => 1,
        OP_WIDE => match code.get(pc + 1) {
            Some(&OP_IINC) => 6,
            Some(_) => 4,
            None => return Err(ClassFileError::Truncated(pc + 1)),
        },
        0xc5 => 4,
        0xc6 | 0xc7 => 3,
        0xc8 | 0xc9 => 5,
        _ => return Err(ClassFileError::BadOpcode { opcode, offset: pc }),
    };
    if pc + len > code.len() {
        return Err(ClassFileError::Truncated(code.len()));
    }
    Ok(len)
}

fn switch_padding(pc: usize) -> usize {
    (4 - (pc + 1) % 4) % 4
}

fn is_annotations_attribute(name: &str) -> bool {
    name == "RuntimeVisibleAnnotations" || name == "RuntimeInvisibleAnnotations"
}

/// Returns the type descriptors of every annotation in the attribute body.
fn read_annotations(body: &[u8], pool: &ConstantPool) -> ParseResult<Vec<String>> {
    let mut r = Reader::new(body);
    let count = r.u2()?;
    let mut types = Vec::with_capacity(count as usize);
    for _ in 0..count {
        types.push(read_annotation(&mut r, pool)?);
    }
    Ok(types)
}

fn read_annotation(r: &mut Reader<'_>, pool: &ConstantPool) -> ParseResult<String> {
    let type_name = pool.utf8(r.u2()?)?.to_string();
    let pairs = r.u2()?;
    for _ in 0..pairs {
        r.skip(2)?;
        skip_element_value(r, pool)?;
    }
    Ok(type_name)
}

fn skip_element_value(r: &mut Reader<'_>, pool: &ConstantPool) -> ParseResult<()> {
    let at = r.pos;
    match r.u1()? {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' | b'c' => r.skip(2),
        b'e' => r.skip(4),
        b'@' => read_annotation(r, pool).map(|_| ()),
        b'[' => {
            let count = r.u2()?;
            for _ in 0..count {
                skip_element_value(r, pool)?;
            }
            Ok(())
        }
        _ => Err(ClassFileError::Truncated(at)),
    }
}

fn skip_attributes(r: &mut Reader<'_>) -> ParseResult<()> {
    let count = r.u2()?;
    for _ in 0..count {
        r.skip(2)?;
        let len = r.u4()? as usize;
        r.skip(len)?;
    }
    Ok(())
}

#[derive(Debug, Clone)]
enum Constant {
    Unusable,
    Utf8(String),
    /// Only an error once something needs it as a name or descriptor.
    BadUtf8,
    Class(u16),
    NameAndType(u16, u16),
    MethodRef(u16, u16),
    Other,
}

#[derive(Debug)]
struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    fn read(r: &mut Reader<'_>) -> ParseResult<Self> {
        let count = r.u2()?;
        let mut entries = vec![Constant::Unusable; count.max(1) as usize];
        let mut index = 1u16;
        while index < count {
            let tag = r.u1()?;
            let mut slots = 1;
            entries[index as usize] = match tag {
                1 => {
                    let len = r.u2()? as usize;
                    match decode_modified_utf8(r.take(len)?) {
                        Some(text) => Constant::Utf8(text),
                        None => Constant::BadUtf8,
                    }
                }
                3 | 4 => {
                    r.skip(4)?;
                    Constant::Other
                }
                5 | 6 => {
                    r.skip(8)?;
                    slots = 2;
                    Constant::Other
                }
                7 => Constant::Class(r.u2()?),
                8 | 16 | 19 | 20 => {
                    r.skip(2)?;
                    Constant::Other
                }
                9 | 17 | 18 => {
                    r.skip(4)?;
                    Constant::Other
                }
                10 | 11 => Constant::MethodRef(r.u2()?, r.u2()?),
                12 => Constant::NameAndType(r.u2()?, r.u2()?),
                15 => {
                    r.skip(3)?;
                    Constant::Other
                }
                _ => return Err(ClassFileError::UnknownConstant { tag, index }),
            };
            index = index.saturating_add(slots);
        }
        Ok(Self { entries })
    }

    fn get(&self, index: u16) -> ParseResult<&Constant> {
        self.entries
            .get(index as usize)
            .ok_or(ClassFileError::BadConstantRef(index))
    }

    fn utf8(&self, index: u16) -> ParseResult<&str> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            Constant::BadUtf8 => Err(ClassFileError::BadUtf8(index)),
            _ => Err(ClassFileError::BadConstantRef(index)),
        }
    }

    fn class_name(&self, index: u16) -> ParseResult<String> {
        match self.get(index)? {
            Constant::Class(name) => Ok(self.utf8(*name)?.to_string()),
            _ => Err(ClassFileError::BadConstantRef(index)),
        }
    }

    fn member_ref(&self, index: u16) -> ParseResult<MemberRef> {
        let Constant::MethodRef(class, nat) = self.get(index)? else {
            return Err(ClassFileError::BadConstantRef(index));
        };
        let Constant::NameAndType(name, descriptor) = self.get(*nat)? else {
            return Err(ClassFileError::BadConstantRef(*nat));
        };
        Ok(MemberRef {
            owner: self.class_name(*class)?,
            name: self.utf8(*name)?.to_string(),
            descriptor: self.utf8(*descriptor)?.to_string(),
        })
    }
}

/// Decodes the JVM's modified UTF-8: NUL is `C0 80` and supplementary
/// characters are surrogate pairs of three bytes each. Four-byte sequences,
/// raw NUL and unpaired surrogates are rejected.
fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    if bytes.iter().all(|b| (0x01..0x80).contains(b)) {
        return String::from_utf8(bytes.to_vec()).ok();
    }
    let continuation = |at: usize| -> Option<u16> {
        let b = *bytes.get(at)?;
        (b & 0xc0 == 0x80).then_some(u16::from(b & 0x3f))
    };
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = u16::from(bytes[i]);
        match bytes[i] {
            0x01..=0x7f => {
                units.push(b);
                i += 1;
            }
            0xc0..=0xdf => {
                units.push(((b & 0x1f) << 6) | continuation(i + 1)?);
                i += 2;
            }
            0xe0..=0xef => {
                units.push(((b & 0x0f) << 12) | (continuation(i + 1)? << 6) | continuation(i + 2)?);
                i += 3;
            }
            _ => return None,
        }
    }
    String::from_utf16(&units).ok()
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> ParseResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(ClassFileError::Truncated(self.pos))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn skip(&mut self, n: usize) -> ParseResult<()> {
        self.take(n).map(|_| ())
    }

    fn u1(&mut self) -> ParseResult<u8> {
        Ok(self.take(1)?[0])
    }

    fn u2(&mut self) -> ParseResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u4(&mut self) -> ParseResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-assembled class with one method `run()V` that declares a checked
    /// exception, calls `Fiber.park()` and synchronizes on `this`.
    fn sample_class() -> Vec<u8> {
        let mut pool: Vec<Vec<u8>> = Vec::new();
        let utf8 = |pool: &mut Vec<Vec<u8>>, s: &str| {
            let mut e = vec![1u8];
            e.extend((s.len() as u16).to_be_bytes());
            e.extend(s.as_bytes());
            pool.push(e);
            pool.len() as u16
        };
        let class = |pool: &mut Vec<Vec<u8>>, utf: u16| {
            let mut e = vec![7u8];
            e.extend(utf.to_be_bytes());
            pool.push(e);
            pool.len() as u16
        };

        let this_utf = utf8(&mut pool, "com/example/Worker");
        let this = class(&mut pool, this_utf);
        let super_utf = utf8(&mut pool, "java/lang/Object");
        let super_ = class(&mut pool, super_utf);
        let iface_utf = utf8(&mut pool, "java/lang/Runnable");
        let iface = class(&mut pool, iface_utf);
        let exc_utf = utf8(&mut pool, "co/paralleluniverse/fibers/SuspendExecution");
        let exc = class(&mut pool, exc_utf);
        let fiber_utf = utf8(&mut pool, "co/paralleluniverse/fibers/Fiber");
        let fiber = class(&mut pool, fiber_utf);
        let park = utf8(&mut pool, "park");
        let run = utf8(&mut pool, "run");
        let void = utf8(&mut pool, "()V");
        let mut nat = vec![12u8];
        nat.extend(park.to_be_bytes());
        nat.extend(void.to_be_bytes());
        pool.push(nat);
        let nat = pool.len() as u16;
        let mut mref = vec![10u8];
        mref.extend(fiber.to_be_bytes());
        mref.extend(nat.to_be_bytes());
        pool.push(mref);
        let mref = pool.len() as u16;
        // A long occupies two slots; the index after it must still resolve.
        pool.push(vec![5, 0, 0, 0, 0, 0, 0, 0, 1]);
        pool.push(Vec::new());
        let code_name = utf8(&mut pool, "Code");
        let exceptions_name = utf8(&mut pool, "Exceptions");
        let ann_name = utf8(&mut pool, "RuntimeVisibleAnnotations");
        let ann_type = utf8(&mut pool, "Lco/paralleluniverse/fibers/Instrumented;");

        let code: Vec<u8> = vec![
            0x2a, 0xc2, // aload_0, monitorenter
            0xb8, (mref >> 8) as u8, mref as u8, // invokestatic
            0x10, 0x07, 0x57, // bipush 7, pop
            0x2a, 0xc3, // aload_0, monitorexit
            0xb1, // return
        ];

        let mut out = Vec::new();
        out.extend(MAGIC.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(52u16.to_be_bytes());
        out.extend((pool.len() as u16 + 1).to_be_bytes());
        for e in &pool {
            out.extend(e);
        }
        out.extend(0x0021u16.to_be_bytes());
        out.extend(this.to_be_bytes());
        out.extend(super_.to_be_bytes());
        out.extend(1u16.to_be_bytes());
        out.extend(iface.to_be_bytes());
        out.extend(0u16.to_be_bytes());

        out.extend(1u16.to_be_bytes());
        out.extend(0x0001u16.to_be_bytes());
        out.extend(run.to_be_bytes());
        out.extend(void.to_be_bytes());
        out.extend(2u16.to_be_bytes());
        out.extend(code_name.to_be_bytes());
        out.extend((12 + code.len() as u32).to_be_bytes());
        out.extend(2u16.to_be_bytes());
        out.extend(1u16.to_be_bytes());
        out.extend((code.len() as u32).to_be_bytes());
        out.extend(&code);
        out.extend(0u16.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(exceptions_name.to_be_bytes());
        out.extend(4u32.to_be_bytes());
        out.extend(1u16.to_be_bytes());
        out.extend(exc.to_be_bytes());

        out.extend(1u16.to_be_bytes());
        out.extend(ann_name.to_be_bytes());
        out.extend(6u32.to_be_bytes());
        out.extend(1u16.to_be_bytes());
        out.extend(ann_type.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out
    }

    #[test]
    fn parses_names_methods_and_annotations() {
        let class = ClassFile::parse(&sample_class()).unwrap();
        assert_eq!(class.name, "com/example/Worker");
        assert_eq!(class.super_name.as_deref(), Some("java/lang/Object"));
        assert_eq!(class.interfaces, vec!["java/lang/Runnable"]);
        assert!(!class.is_interface());
        assert!(class.has_annotation("Lco/paralleluniverse/fibers/Instrumented;"));

        let run = &class.methods[0];
        assert_eq!(run.signature(), "run()V");
        assert!(run.has_code);
        assert!(run.uses_monitorenter);
        assert_eq!(
            run.exceptions,
            vec!["co/paralleluniverse/fibers/SuspendExecution"]
        );
        assert_eq!(run.calls.len(), 1);
        assert_eq!(run.calls[0].offset, 2);
        assert_eq!(run.calls[0].target.owner, "co/paralleluniverse/fibers/Fiber");
        assert_eq!(run.calls[0].target.name, "park");
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        assert_eq!(
            ClassFile::parse(b"\x00\x01\x02\x03rest"),
            Err(ClassFileError::BadMagic(0x0001_0203))
        );

        let bytes = sample_class();
        let err = ClassFile::parse(&bytes[..bytes.len() - 3]).unwrap_err();
        assert!(matches!(err, ClassFileError::Truncated(_)));
    }

    #[test]
    fn rejects_trailing_bytes() {
        let mut bytes = sample_class();
        bytes.extend([0, 0]);
        assert_eq!(
            ClassFile::parse(&bytes),
            Err(ClassFileError::TrailingBytes(2))
        );
    }

    #[test]
    fn switch_instructions_are_sized_with_padding() {
        // tableswitch at pc 1: 2 bytes padding, default, low=0, high=1, two offsets.
        let mut code = vec![0x00, OP_TABLESWITCH, 0, 0];
        code.extend(0i32.to_be_bytes());
        code.extend(0i32.to_be_bytes());
        code.extend(1i32.to_be_bytes());
        code.extend(0i32.to_be_bytes());
        code.extend(0i32.to_be_bytes());
        assert_eq!(instruction_length(&code, 1).unwrap(), code.len() - 1);

        // lookupswitch at pc 0: 3 bytes padding, default, one pair.
        let mut code = vec![OP_LOOKUPSWITCH, 0, 0, 0];
        code.extend(0i32.to_be_bytes());
        code.extend(1i32.to_be_bytes());
        code.extend(5i32.to_be_bytes());
        code.extend(0i32.to_be_bytes());
        assert_eq!(instruction_length(&code, 0).unwrap(), code.len());

        assert_eq!(instruction_length(&[OP_WIDE, OP_IINC, 0, 1, 0, 1], 0).unwrap(), 6);
        assert_eq!(instruction_length(&[OP_WIDE, 0x15, 0, 1], 0).unwrap(), 4);
        assert!(instruction_length(&[0xca], 0).is_err());
    }

    #[test]
    fn modified_utf8_decodes_nul_and_surrogate_pairs() {
        assert_eq!(decode_modified_utf8(b"com/example/A").as_deref(), Some("com/example/A"));
        assert_eq!(decode_modified_utf8(&[b'a', 0xc0, 0x80, b'b']).as_deref(), Some("a\0b"));
        assert_eq!(decode_modified_utf8(&[0xc3, 0xa9]).as_deref(), Some("\u{e9}"));
        // U+1F600 as a surrogate pair, three bytes per half.
        assert_eq!(
            decode_modified_utf8(&[0xed, 0xa0, 0xbd, 0xed, 0xb8, 0x80]).as_deref(),
            Some("\u{1f600}")
        );
    }

    #[test]
    fn modified_utf8_rejects_what_the_jvm_would_not_write() {
        // Standard four-byte UTF-8.
        assert_eq!(decode_modified_utf8(&[0xf0, 0x9f, 0x98, 0x80]), None);
        // Raw NUL.
        assert_eq!(decode_modified_utf8(&[b'a', 0x00]), None);
        // Unpaired high surrogate.
        assert_eq!(decode_modified_utf8(&[0xed, 0xa0, 0xbd]), None);
        // Truncated two-byte sequence.
        assert_eq!(decode_modified_utf8(&[0xc3]), None);
    }

    #[test]
    fn undecodable_class_name_is_an_error_not_a_mangled_name() {
        let mut bytes = Vec::new();
        bytes.extend(3u16.to_be_bytes());
        bytes.extend([1, 0, 4, b'A', 0xf0, 0x9f, 0x98]);
        bytes.extend([7, 0, 1]);

        let pool = ConstantPool::read(&mut Reader::new(&bytes)).unwrap();
        assert_eq!(pool.class_name(2), Err(ClassFileError::BadUtf8(1)));
    }
}
