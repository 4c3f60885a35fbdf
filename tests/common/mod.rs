#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SUSPEND_EXECUTION: &str = "co/paralleluniverse/fibers/SuspendExecution";
pub const SUSPENDABLE: &str = "Lco/paralleluniverse/fibers/Suspendable;";
pub const INSTRUMENTED: &str = "Lco/paralleluniverse/fibers/Instrumented;";
pub const FIBER: &str = "co/paralleluniverse/fibers/Fiber";

pub fn temp_dir(name: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "fiber_instrument_it_{}_{}_{}",
        std::process::id(),
        nanos,
        name
    ))
}

pub fn write_bytes(path: &Path, content: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

/// Writes `class` to `<root>/<internal name>.class` and returns the path.
pub fn write_class(root: &Path, class: &ClassBuilder) -> anyhow::Result<PathBuf> {
    let path = root.join(format!("{}.class", class.name));
    write_bytes(&path, &class.build())?;
    Ok(path)
}

pub fn write_jar(path: &Path, entries: &[(&str, &[u8])]) -> anyhow::Result<()> {
    use std::io::Write;
    use zip::write::FileOptions;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    let mut zip = zip::ZipWriter::new(file);
    let options = FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, content) in entries {
        zip.start_file(*name, options)?;
        zip.write_all(content)?;
    }
    zip.finish()?;
    Ok(())
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = std::fs::metadata(path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(path, perms)?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct MethodBuilder {
    access: u16,
    name: String,
    descriptor: String,
    throws: Vec<String>,
    annotations: Vec<String>,
    calls: Vec<(String, String, String)>,
    monitor: bool,
    has_code: bool,
}

impl MethodBuilder {
    pub fn new(name: &str, descriptor: &str) -> Self {
        Self {
            access: 0x0001,
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            has_code: true,
            ..Self::default()
        }
    }

    pub fn throws(mut self, class: &str) -> Self {
        self.throws.push(class.to_string());
        self
    }

    pub fn suspendable(self) -> Self {
        self.throws(SUSPEND_EXECUTION)
    }

    pub fn annotated(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.to_string());
        self
    }

    pub fn calls(mut self, owner: &str, name: &str, descriptor: &str) -> Self {
        self.calls
            .push((owner.to_string(), name.to_string(), descriptor.to_string()));
        self
    }

    pub fn synchronized(mut self) -> Self {
        self.access |= 0x0020;
        self
    }

    pub fn enters_monitor(mut self) -> Self {
        self.monitor = true;
        self
    }

    pub fn abstract_method(mut self) -> Self {
        self.access |= 0x0400;
        self.has_code = false;
        self
    }
}

/// Assembles minimal but well-formed class files.
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    pub name: String,
    access: u16,
    super_name: Option<String>,
    interfaces: Vec<String>,
    annotations: Vec<String>,
    methods: Vec<MethodBuilder>,
}

impl ClassBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            access: 0x0021,
            super_name: Some("java/lang/Object".to_string()),
            interfaces: Vec::new(),
            annotations: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn extends(mut self, super_name: &str) -> Self {
        self.super_name = Some(super_name.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn interface(mut self) -> Self {
        self.access = 0x0601;
        self
    }

    pub fn annotated(mut self, descriptor: &str) -> Self {
        self.annotations.push(descriptor.to_string());
        self
    }

    pub fn instrumented(self) -> Self {
        self.annotated(INSTRUMENTED)
    }

    pub fn method(mut self, method: MethodBuilder) -> Self {
        self.methods.push(method);
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut pool = Pool::default();
        let this = pool.class(&self.name);
        let super_index = self.super_name.as_deref().map(|s| pool.class(s)).unwrap_or(0);
        let interfaces: Vec<u16> = self.interfaces.iter().map(|i| pool.class(i)).collect();

        let mut methods = Vec::new();
        for m in &self.methods {
            methods.extend(m.access.to_be_bytes());
            methods.extend(pool.utf8(&m.name).to_be_bytes());
            methods.extend(pool.utf8(&m.descriptor).to_be_bytes());

            let mut attrs: Vec<Vec<u8>> = Vec::new();
            if m.has_code {
                let mut code = Vec::new();
                for (owner, name, descriptor) in &m.calls {
                    let index = pool.method_ref(owner, name, descriptor);
                    code.push(0xb8);
                    code.extend(index.to_be_bytes());
                }
                if m.monitor {
                    code.extend([0x2a, 0xc2, 0x2a, 0xc3]);
                }
                code.push(0xb1);

                let mut body = Vec::new();
                body.extend(4u16.to_be_bytes());
                body.extend(4u16.to_be_bytes());
                body.extend((code.len() as u32).to_be_bytes());
                body.extend(&code);
                body.extend(0u16.to_be_bytes());
                body.extend(0u16.to_be_bytes());
                attrs.push(attribute(&mut pool, "Code", &body));
            }
            if !m.throws.is_empty() {
                let mut body = Vec::new();
                body.extend((m.throws.len() as u16).to_be_bytes());
                for t in &m.throws {
                    body.extend(pool.class(t).to_be_bytes());
                }
                attrs.push(attribute(&mut pool, "Exceptions", &body));
            }
            if !m.annotations.is_empty() {
                let body = annotations(&mut pool, &m.annotations);
                attrs.push(attribute(&mut pool, "RuntimeVisibleAnnotations", &body));
            }
            methods.extend((attrs.len() as u16).to_be_bytes());
            for a in attrs {
                methods.extend(a);
            }
        }

        let mut class_attrs: Vec<Vec<u8>> = Vec::new();
        if !self.annotations.is_empty() {
            let body = annotations(&mut pool, &self.annotations);
            class_attrs.push(attribute(&mut pool, "RuntimeVisibleAnnotations", &body));
        }

        let mut out = Vec::new();
        out.extend(0xCAFE_BABEu32.to_be_bytes());
        out.extend(0u16.to_be_bytes());
        out.extend(52u16.to_be_bytes());
        out.extend(((pool.entries.len() + 1) as u16).to_be_bytes());
        for e in &pool.entries {
            out.extend(e);
        }
        out.extend(self.access.to_be_bytes());
        out.extend(this.to_be_bytes());
        out.extend(super_index.to_be_bytes());
        out.extend((interfaces.len() as u16).to_be_bytes());
        for i in interfaces {
            out.extend(i.to_be_bytes());
        }
        out.extend(0u16.to_be_bytes());
        out.extend((self.methods.len() as u16).to_be_bytes());
        out.extend(methods);
        out.extend((class_attrs.len() as u16).to_be_bytes());
        for a in class_attrs {
            out.extend(a);
        }
        out
    }
}

fn attribute(pool: &mut Pool, name: &str, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend(pool.utf8(name).to_be_bytes());
    out.extend((body.len() as u32).to_be_bytes());
    out.extend(body);
    out
}

fn annotations(pool: &mut Pool, descriptors: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend((descriptors.len() as u16).to_be_bytes());
    for d in descriptors {
        body.extend(pool.utf8(d).to_be_bytes());
        body.extend(0u16.to_be_bytes());
    }
    body
}

#[derive(Default)]
struct Pool {
    entries: Vec<Vec<u8>>,
    index: HashMap<Vec<u8>, u16>,
}

impl Pool {
    fn add(&mut self, entry: Vec<u8>) -> u16 {
        if let Some(i) = self.index.get(&entry) {
            return *i;
        }
        self.entries.push(entry.clone());
        let i = self.entries.len() as u16;
        self.index.insert(entry, i);
        i
    }

    fn utf8(&mut self, s: &str) -> u16 {
        let mut e = vec![1u8];
        e.extend((s.len() as u16).to_be_bytes());
        e.extend(s.as_bytes());
        self.add(e)
    }

    fn class(&mut self, name: &str) -> u16 {
        let utf = self.utf8(name);
        let mut e = vec![7u8];
        e.extend(utf.to_be_bytes());
        self.add(e)
    }

    fn method_ref(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class = self.class(owner);
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        let mut nat = vec![12u8];
        nat.extend(name.to_be_bytes());
        nat.extend(descriptor.to_be_bytes());
        let nat = self.add(nat);
        let mut e = vec![10u8];
        e.extend(class.to_be_bytes());
        e.extend(nat.to_be_bytes());
        self.add(e)
    }
}
