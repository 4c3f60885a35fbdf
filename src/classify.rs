//! Per-class suspendability facts, extracted from a single class file.
//!
//! Facts are local to one class. Whether a method is suspendable because a
//! supertype says so, or whether a call targets a suspendable method in
//! another class, is only decided once every class has been recorded, see
//! [`crate::database::DatabaseBuilder::finish`].

use std::collections::HashSet;

use crate::classfile::{CallSite, ClassFile, ClassFileError, MemberRef};

pub const SUSPEND_EXECUTION: &str = "co/paralleluniverse/fibers/SuspendExecution";
pub const RUNTIME_SUSPEND_EXECUTION: &str = "co/paralleluniverse/fibers/RuntimeSuspendExecution";
pub const SUSPENDABLE_ANNOTATION: &str = "Lco/paralleluniverse/fibers/Suspendable;";
pub const INSTRUMENTED_ANNOTATION: &str = "Lco/paralleluniverse/fibers/Instrumented;";

pub const SUSPENDABLES_RESOURCE: &str = "META-INF/suspendables";
pub const SUSPENDABLE_SUPERS_RESOURCE: &str = "META-INF/suspendable-supers";

/// Runtime entry points that suspend the calling fiber, by owner and name.
const KNOWN_SUSPEND_POINTS: &[(&str, &[&str])] = &[
    (
        "co/paralleluniverse/fibers/Fiber",
        &[
            "park",
            "parkAndUnpark",
            "parkAndSerialize",
            "yield",
            "yieldAndUnpark",
            "sleep",
            "join",
            "get",
        ],
    ),
    (
        "co/paralleluniverse/strands/Strand",
        &["park", "parkNanos", "parkUntil", "yield", "sleep", "join"],
    ),
];

/// Calls that block the carrier thread instead of suspending the fiber.
const BLOCKING_CALLS: &[(&str, &[&str])] = &[
    ("java/lang/Thread", &["sleep", "join"]),
    ("java/lang/Object", &["wait"]),
    (
        "java/util/concurrent/locks/LockSupport",
        &["park", "parkNanos", "parkUntil"],
    ),
    ("java/util/concurrent/locks/Lock", &["lock", "lockInterruptibly"]),
    ("java/util/concurrent/BlockingQueue", &["take", "put"]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodFacts {
    pub name: String,
    pub descriptor: String,
    /// Declares `SuspendExecution` or carries `@Suspendable`.
    pub declared_suspendable: bool,
    pub has_code: bool,
    pub uses_monitors: bool,
    pub calls: Vec<CallSite>,
}

impl MethodFacts {
    pub fn signature(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }

    pub fn is_initializer(&self) -> bool {
        self.name == "<init>" || self.name == "<clinit>"
    }

    pub fn blocking_calls(&self) -> impl Iterator<Item = &CallSite> {
        self.calls.iter().filter(|c| is_blocking_call(&c.target))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassFacts {
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub is_interface: bool,
    pub instrumented: bool,
    pub methods: Vec<MethodFacts>,
}

impl ClassFacts {
    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodFacts> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn supertypes(&self) -> impl Iterator<Item = &str> {
        self.super_name
            .iter()
            .chain(self.interfaces.iter())
            .map(String::as_str)
    }
}

impl From<ClassFile> for ClassFacts {
    fn from(class: ClassFile) -> Self {
        let instrumented = class.has_annotation(INSTRUMENTED_ANNOTATION);
        let is_interface = class.is_interface();
        let methods = class
            .methods
            .into_iter()
            .map(|m| {
                let declared_suspendable = m
                    .exceptions
                    .iter()
                    .any(|e| e == SUSPEND_EXECUTION || e == RUNTIME_SUSPEND_EXECUTION)
                    || m.has_annotation(SUSPENDABLE_ANNOTATION);
                MethodFacts {
                    declared_suspendable,
                    has_code: m.has_code && !m.is_abstract() && !m.is_native(),
                    uses_monitors: m.is_synchronized() || m.uses_monitorenter,
                    name: m.name,
                    descriptor: m.descriptor,
                    calls: m.calls,
                }
            })
            .collect();

        Self {
            name: class.name,
            super_name: class.super_name,
            interfaces: class.interfaces,
            is_interface,
            instrumented,
            methods,
        }
    }
}

/// Reads the suspendability facts of one class file.
pub fn analyze(bytes: &[u8]) -> Result<ClassFacts, ClassFileError> {
    ClassFile::parse(bytes).map(ClassFacts::from)
}

pub fn is_known_suspend_point(target: &MemberRef) -> bool {
    matches_table(KNOWN_SUSPEND_POINTS, target)
}

pub fn is_blocking_call(target: &MemberRef) -> bool {
    matches_table(BLOCKING_CALLS, target)
}

fn matches_table(table: &[(&str, &[&str])], target: &MemberRef) -> bool {
    table
        .iter()
        .any(|(owner, names)| *owner == target.owner && names.contains(&target.name.as_str()))
}

/// Method lists from `META-INF/suspendables` and
/// `META-INF/suspendable-supers` resources.
///
/// Each non-comment line names a method as `package.Class.method`; the
/// method matches regardless of its descriptor. Entries in `suspendables`
/// mark the method itself suspendable, entries in `suspendable-supers` mark
/// every override of it suspendable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuspendableLists {
    methods: HashSet<(String, String)>,
    supers: HashSet<(String, String)>,
}

impl SuspendableLists {
    pub fn add_suspendables(&mut self, content: &str) {
        self.methods.extend(parse_method_list(content));
    }

    pub fn add_suspendable_supers(&mut self, content: &str) {
        self.supers.extend(parse_method_list(content));
    }

    pub fn is_suspendable(&self, class_name: &str, method: &str) -> bool {
        self.methods
            .contains(&(class_name.to_string(), method.to_string()))
    }

    pub fn is_suspendable_super(&self, class_name: &str, method: &str) -> bool {
        self.supers
            .contains(&(class_name.to_string(), method.to_string()))
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.supers.is_empty()
    }
}

fn parse_method_list(content: &str) -> impl Iterator<Item = (String, String)> + '_ {
    content.lines().filter_map(|line| {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let (class, method) = line.rsplit_once('.')?;
        if class.is_empty() || method.is_empty() {
            return None;
        }
        Some((class.replace('.', "/"), method.to_string()))
    })
}
