//! Lookup of classes and resources outside the build directory: class
//! directories and jar files supplied as the classpath.

use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::classify::{SUSPENDABLE_SUPERS_RESOURCE, SUSPENDABLES_RESOURCE, SuspendableLists};
use crate::scan::{class_name_to_class_path, scan_jars};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassPathEntry {
    Directory(PathBuf),
    Jar(PathBuf),
}

#[derive(Debug, Clone, Default)]
pub struct ClassPath {
    entries: Vec<ClassPathEntry>,
}

impl ClassPath {
    /// Builds a classpath from directories and jars. Directories contribute
    /// their own class files and every jar found below them; paths that do
    /// not exist are ignored.
    pub fn new<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut entries = Vec::new();
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                entries.push(ClassPathEntry::Directory(path.to_path_buf()));
                entries.extend(scan_jars(path).into_iter().map(ClassPathEntry::Jar));
            } else if path.is_file() && path.extension().is_some_and(|e| e == "jar") {
                entries.push(ClassPathEntry::Jar(path.to_path_buf()));
            } else {
                log::debug!(
                    target: crate::log_bridge::TARGET,
                    "Ignoring classpath entry {}",
                    path.display()
                );
            }
        }
        entries.dedup();
        Self { entries }
    }

    pub fn entries(&self) -> &[ClassPathEntry] {
        &self.entries
    }

    /// Bytes of the first class file named `class_name` on the classpath.
    pub fn read_class(&self, class_name: &str) -> Option<Vec<u8>> {
        self.read_resource(&class_name_to_class_path(class_name))
    }

    pub fn read_resource(&self, resource: &str) -> Option<Vec<u8>> {
        self.entries
            .iter()
            .find_map(|entry| read_entry(entry, resource).ok().flatten())
    }

    /// Every copy of `resource` on the classpath, in classpath order.
    pub fn read_all_resources(&self, resource: &str) -> Vec<Vec<u8>> {
        self.entries
            .iter()
            .filter_map(|entry| read_entry(entry, resource).ok().flatten())
            .collect()
    }

    pub fn suspendable_lists(&self) -> SuspendableLists {
        let mut lists = SuspendableLists::default();
        for content in self.read_all_resources(SUSPENDABLES_RESOURCE) {
            lists.add_suspendables(&String::from_utf8_lossy(&content));
        }
        for content in self.read_all_resources(SUSPENDABLE_SUPERS_RESOURCE) {
            lists.add_suspendable_supers(&String::from_utf8_lossy(&content));
        }
        lists
    }
}

fn read_entry(entry: &ClassPathEntry, resource: &str) -> Result<Option<Vec<u8>>> {
    match entry {
        ClassPathEntry::Directory(dir) => {
            let path = dir.join(resource);
            if !path.is_file() {
                return Ok(None);
            }
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(Some(bytes))
        }
        ClassPathEntry::Jar(jar) => read_jar_entry(jar, resource),
    }
}

pub fn read_jar_entry(jar_path: &Path, entry_name: &str) -> Result<Option<Vec<u8>>> {
    let file =
        File::open(jar_path).with_context(|| format!("Failed to open jar: {}", jar_path.display()))?;
    // SAFETY: The file is opened read-only and outlives the mapping, which is
    // dropped at the end of this function.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("Failed to mmap jar: {}", jar_path.display()))?;
    let mut archive = ZipArchive::new(Cursor::new(&mmap[..]))
        .with_context(|| format!("Failed to read zip structure: {}", jar_path.display()))?;

    let Ok(mut entry) = archive.by_name(entry_name) else {
        return Ok(None);
    };
    let mut bytes = Vec::with_capacity(entry.size() as usize);
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to read {entry_name} from {}", jar_path.display()))?;
    Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::sync::atomic::{AtomicU64, Ordering};
    use zip::write::{FileOptions, ZipWriter};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "fiber_instrument_classpath_{}_{}_{}_{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos(),
            n,
            name
        ))
    }

    fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = fs::File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn reads_classes_from_directories_before_jars() {
        let base = temp_dir("lookup");
        let classes = base.join("classes");
        fs::create_dir_all(classes.join("com/example")).unwrap();
        fs::write(classes.join("com/example/Base.class"), b"from-dir").unwrap();
        write_jar(
            &base.join("lib/dep.jar"),
            &[
                ("com/example/Base.class", b"from-jar"),
                ("org/acme/Dep.class", b"dep"),
            ],
        );

        let cp = ClassPath::new([classes, base.join("lib"), base.join("missing")]);
        assert_eq!(cp.entries().len(), 3);
        assert_eq!(cp.read_class("com/example/Base").unwrap(), b"from-dir");
        assert_eq!(cp.read_class("org.acme.Dep").unwrap(), b"dep");
        assert!(cp.read_class("org/acme/Missing").is_none());

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn collects_suspendable_lists_from_every_entry() {
        let base = temp_dir("lists");
        let classes = base.join("classes");
        fs::create_dir_all(classes.join("META-INF")).unwrap();
        fs::write(
            classes.join(SUSPENDABLES_RESOURCE),
            "com.example.Service.call\n",
        )
        .unwrap();
        let jar = base.join("dep.jar");
        write_jar(
            &jar,
            &[
                (SUSPENDABLES_RESOURCE, b"org.acme.Client.fetch\n"),
                (SUSPENDABLE_SUPERS_RESOURCE, b"org.acme.Handler.handle\n"),
            ],
        );

        let lists = ClassPath::new([classes, jar]).suspendable_lists();
        assert!(lists.is_suspendable("com/example/Service", "call"));
        assert!(lists.is_suspendable("org/acme/Client", "fetch"));
        assert!(lists.is_suspendable_super("org/acme/Handler", "handle"));

        let _ = fs::remove_dir_all(base);
    }

    #[test]
    fn read_jar_entry_reports_corrupt_jars() {
        let base = temp_dir("corrupt");
        fs::create_dir_all(&base).unwrap();
        let jar = base.join("broken.jar");
        fs::write(&jar, b"not a zip").unwrap();

        assert!(read_jar_entry(&jar, "A.class").is_err());
        assert!(ClassPath::new([&jar]).read_class("A").is_none());

        let _ = fs::remove_dir_all(base);
    }
}
