//! The method/class database.
//!
//! Classification happens in two phases. [`DatabaseBuilder`] records the
//! facts of every scanned class; [`DatabaseBuilder::finish`] then resolves
//! what depends on other classes (inherited suspendability, calls into
//! suspendable methods elsewhere) and yields an immutable [`ClassDatabase`]
//! that the rewrite phase reads from.

use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::classfile::MemberRef;
use crate::classify::{self, ClassFacts, SuspendableLists};
use crate::classpath::ClassPath;
use crate::filter::{internal_name, is_problematic, should_instrument};
use crate::scan::ClassFileRef;

pub const OBJECT: &str = "java/lang/Object";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Excluded by name; never analyzed further.
    NotCandidate,
    NoInstrumentation,
    RequiresInstrumentation,
}

/// A call from a method of the class to another method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallPoint {
    pub method: String,
    pub target: String,
    pub offset: usize,
}

impl CallPoint {
    fn new(method: String, target: &MemberRef, offset: usize) -> Self {
        Self {
            method,
            target: format!("{}.{}{}", target.owner, target.name, target.descriptor),
            offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassEntry {
    pub name: String,
    pub file: ClassFileRef,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub classification: Classification,
    pub instrumented: bool,
    pub problematic: bool,
    pub suspendable_methods: Vec<String>,
    pub suspend_points: Vec<CallPoint>,
    /// Suspendable methods that are `synchronized` or enter a monitor.
    pub monitor_methods: Vec<String>,
    /// Known blocking calls made from suspendable methods.
    pub blocking_calls: Vec<CallPoint>,
}

impl ClassEntry {
    pub fn requires_instrumentation(&self) -> bool {
        self.classification == Classification::RequiresInstrumentation
    }

    pub fn has_suspend_points(&self) -> bool {
        !self.suspend_points.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkListEntry {
    pub name: String,
    pub file: ClassFileRef,
}

#[derive(Debug, Clone)]
struct Recorded {
    file: ClassFileRef,
    facts: ClassFacts,
}

/// Write phase of the database.
#[derive(Debug)]
pub struct DatabaseBuilder {
    scanned_files: usize,
    order: Vec<String>,
    classes: HashMap<String, Recorded>,
    classpath: ClassPath,
    lists: SuspendableLists,
}

impl DatabaseBuilder {
    pub fn new(classpath: ClassPath, lists: SuspendableLists) -> Self {
        Self {
            scanned_files: 0,
            order: Vec::new(),
            classes: HashMap::new(),
            classpath,
            lists,
        }
    }

    /// Records a scanned class under the name found in its class file.
    /// Returns `false` if a class with that name was already recorded, in
    /// which case the first sighting wins.
    pub fn record(&mut self, file: ClassFileRef, facts: ClassFacts) -> bool {
        if self.classes.contains_key(&facts.name) {
            return false;
        }
        self.order.push(facts.name.clone());
        self.classes.insert(facts.name.clone(), Recorded { file, facts });
        true
    }

    /// Counts a scanned class file, whether or not it could be recorded.
    pub fn note_scanned(&mut self) {
        self.scanned_files += 1;
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn finish(self) -> ClassDatabase {
        let mut resolver = Resolver {
            classes: &self.classes,
            classpath: &self.classpath,
            lists: &self.lists,
            loaded: HashMap::new(),
        };

        let mut entries = HashMap::with_capacity(self.classes.len());
        for name in &self.order {
            let recorded = &self.classes[name];
            let entry = resolver.classify(recorded);
            entries.insert(name.clone(), entry);
        }

        ClassDatabase {
            scanned_files: self.scanned_files,
            order: self.order,
            entries,
            classpath: self.classpath,
        }
    }
}

/// Resolves cross-class facts during [`DatabaseBuilder::finish`]. Classes
/// that are not in the build directory are loaded from the classpath once.
struct Resolver<'a> {
    classes: &'a HashMap<String, Recorded>,
    classpath: &'a ClassPath,
    lists: &'a SuspendableLists,
    loaded: HashMap<String, Option<ClassFacts>>,
}

impl Resolver<'_> {
    fn classify(&mut self, recorded: &Recorded) -> ClassEntry {
        let facts = &recorded.facts;
        let mut entry = ClassEntry {
            name: facts.name.clone(),
            file: recorded.file.clone(),
            super_name: facts.super_name.clone(),
            interfaces: facts.interfaces.clone(),
            is_interface: facts.is_interface,
            classification: Classification::NotCandidate,
            instrumented: facts.instrumented,
            problematic: is_problematic(&facts.name),
            suspendable_methods: Vec::new(),
            suspend_points: Vec::new(),
            monitor_methods: Vec::new(),
            blocking_calls: Vec::new(),
        };
        if entry.problematic || !should_instrument(&facts.name) {
            return entry;
        }

        let mut needs_rewrite = false;
        for method in &facts.methods {
            let suspendable = !method.is_initializer()
                && (method.declared_suspendable
                    || self.lists.is_suspendable(&facts.name, &method.name)
                    || self.inherits_suspendable(facts, &method.name, &method.descriptor));

            for call in &method.calls {
                if self.is_suspendable_target(&call.target) {
                    entry
                        .suspend_points
                        .push(CallPoint::new(method.signature(), &call.target, call.offset));
                }
            }

            if !suspendable {
                continue;
            }
            entry.suspendable_methods.push(method.signature());
            needs_rewrite |= method.has_code;
            if method.uses_monitors {
                entry.monitor_methods.push(method.signature());
            }
            entry.blocking_calls.extend(
                method
                    .blocking_calls()
                    .map(|c| CallPoint::new(method.signature(), &c.target, c.offset)),
            );
        }

        entry.classification = if needs_rewrite && !facts.instrumented {
            Classification::RequiresInstrumentation
        } else {
            Classification::NoInstrumentation
        };
        entry
    }

    fn facts(&mut self, class_name: &str) -> Option<ClassFacts> {
        if let Some(recorded) = self.classes.get(class_name) {
            return Some(recorded.facts.clone());
        }
        if let Some(cached) = self.loaded.get(class_name) {
            return cached.clone();
        }
        let facts = self
            .classpath
            .read_class(class_name)
            .and_then(|bytes| classify::analyze(&bytes).ok());
        self.loaded.insert(class_name.to_string(), facts.clone());
        facts
    }

    /// Whether any supertype of `class` declares `name descriptor` as
    /// suspendable, or lists it as a suspendable super.
    fn inherits_suspendable(&mut self, class: &ClassFacts, name: &str, descriptor: &str) -> bool {
        let mut visited = HashSet::new();
        let mut pending: Vec<String> = class.supertypes().map(str::to_string).collect();
        while let Some(super_name) = pending.pop() {
            if !visited.insert(super_name.clone()) {
                continue;
            }
            if self.lists.is_suspendable_super(&super_name, name) {
                return true;
            }
            let Some(facts) = self.facts(&super_name) else {
                continue;
            };
            if facts
                .method(name, descriptor)
                .is_some_and(|m| m.declared_suspendable)
                || self.lists.is_suspendable(&super_name, name)
            {
                return true;
            }
            pending.extend(facts.supertypes().map(str::to_string));
        }
        false
    }

    fn is_suspendable_target(&mut self, target: &MemberRef) -> bool {
        if classify::is_known_suspend_point(target) {
            return true;
        }
        if self.lists.is_suspendable(&target.owner, &target.name) {
            return true;
        }
        let Some(owner) = self.facts(&target.owner) else {
            return false;
        };
        if owner
            .method(&target.name, &target.descriptor)
            .is_some_and(|m| m.declared_suspendable)
        {
            return true;
        }
        self.inherits_suspendable(&owner, &target.name, &target.descriptor)
    }
}

/// Read phase of the database: classification results for one run.
#[derive(Debug)]
pub struct ClassDatabase {
    scanned_files: usize,
    order: Vec<String>,
    entries: HashMap<String, ClassEntry>,
    classpath: ClassPath,
}

impl ClassDatabase {
    /// Looks up a class by dotted or slash-form name.
    pub fn get(&self, class_name: &str) -> Option<&ClassEntry> {
        self.entries.get(&internal_name(class_name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Class files seen by the scan, including malformed files and
    /// duplicate copies that were not recorded.
    pub fn scanned_files(&self) -> usize {
        self.scanned_files
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Entries in recording order.
    pub fn entries(&self) -> impl Iterator<Item = &ClassEntry> {
        self.order.iter().map(|name| &self.entries[name])
    }

    /// Classes that require instrumentation, in recording order.
    pub fn work_list(&self) -> Vec<WorkListEntry> {
        self.entries()
            .filter(|e| e.requires_instrumentation())
            .map(|e| WorkListEntry {
                name: e.name.clone(),
                file: e.file.clone(),
            })
            .collect()
    }

    /// The nearest common superclass of two internal names, as needed when
    /// recomputing stack map frames. Interfaces and types that cannot be
    /// resolved fall back to `java/lang/Object`.
    pub fn common_super_class(&self, type_a: &str, type_b: &str) -> String {
        if type_a == type_b {
            return type_a.to_string();
        }
        let (Some(a), Some(b)) = (self.type_info(type_a), self.type_info(type_b)) else {
            return OBJECT.to_string();
        };
        if a.is_interface || b.is_interface {
            return OBJECT.to_string();
        }
        if self.is_superclass_of(type_a, type_b) {
            return type_a.to_string();
        }
        if self.is_superclass_of(type_b, type_a) {
            return type_b.to_string();
        }

        let mut visited = HashSet::new();
        let mut current = a.super_name;
        while let Some(candidate) = current {
            if !visited.insert(candidate.clone()) {
                break;
            }
            if self.is_superclass_of(&candidate, type_b) {
                return candidate;
            }
            current = self.type_info(&candidate).and_then(|t| t.super_name);
        }
        OBJECT.to_string()
    }

    /// Whether `ancestor` appears on the superclass chain of `class_name`.
    fn is_superclass_of(&self, ancestor: &str, class_name: &str) -> bool {
        if ancestor == OBJECT {
            return true;
        }
        let mut visited = HashSet::new();
        let mut current = Some(class_name.to_string());
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            if !visited.insert(name.clone()) {
                return false;
            }
            current = self.type_info(&name).and_then(|t| t.super_name);
        }
        false
    }

    fn type_info(&self, class_name: &str) -> Option<TypeInfo> {
        if let Some(entry) = self.entries.get(class_name) {
            return Some(TypeInfo {
                super_name: entry.super_name.clone(),
                is_interface: entry.is_interface,
            });
        }
        let bytes = self.classpath.read_class(class_name)?;
        let facts = classify::analyze(&bytes).ok()?;
        Some(TypeInfo {
            super_name: facts.super_name,
            is_interface: facts.is_interface,
        })
    }
}

struct TypeInfo {
    super_name: Option<String>,
    is_interface: bool,
}
