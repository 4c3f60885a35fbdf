//! Name-based filtering: the configured inclusion prefixes and the fixed
//! exclusion rules for classes that must never be instrumented.

use serde::{Deserialize, Serialize};

pub const FIBER_CLASS_NAME: &str = "co/paralleluniverse/fibers/Fiber";
pub const STACK_CLASS_NAME: &str = "co/paralleluniverse/fibers/Stack";

const INSTRUMENTOR_PACKAGE: &str = "co/paralleluniverse/fibers/instrument/";
const EXCLUDED_PACKAGES: [&str; 2] = ["org/objectweb/asm/", "org/netbeans/lib/"];
const PROBLEMATIC_PACKAGES: [&str; 5] = [
    "org/gradle/",
    "javax/jms/",
    "ch/qos/logback/",
    "org/apache/logging/log4j/",
    "org/apache/log4j/",
];

/// Package prefixes that restrict which classes get rewritten.
///
/// Prefixes may be written with dots or slashes; both match the slash-form
/// class name. An empty policy includes every class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InclusionPolicy {
    prefixes: Vec<String>,
}

impl InclusionPolicy {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        policy.extend(prefixes);
        policy
    }

    pub fn extend<I, S>(&mut self, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for prefix in prefixes {
            let prefix = prefix.as_ref().trim().replace('.', "/");
            if !prefix.is_empty() && !self.prefixes.contains(&prefix) {
                self.prefixes.push(prefix);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    pub fn includes(&self, class_name: &str) -> bool {
        if self.prefixes.is_empty() {
            return true;
        }
        let name = internal_name(class_name);
        self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Converts a dotted binary name to its slash form. Slash-form input is
/// returned unchanged.
pub fn internal_name(class_name: &str) -> String {
    class_name.replace('.', "/")
}

/// JDK core packages, never instrumented.
pub fn is_java_core(class_name: &str) -> bool {
    class_name.starts_with("java/")
        || class_name.starts_with("javax/")
        || class_name.starts_with("sun/")
        || (class_name.starts_with("com/sun/") && !class_name.starts_with("com/sun/jersey"))
}

/// Classes known to trip up analysis. They are skipped like any other
/// non-candidate but kept out of verbose logs.
pub fn is_problematic(class_name: &str) -> bool {
    PROBLEMATIC_PACKAGES.iter().any(|p| class_name.starts_with(p))
}

/// Whether a class may be handed to the rewrite step at all: the
/// instrumentor itself, the bytecode library, the fiber runtime core and the
/// JDK are off limits.
pub fn should_instrument(class_name: &str) -> bool {
    let name = internal_name(class_name);
    !(name.starts_with(INSTRUMENTOR_PACKAGE)
        || EXCLUDED_PACKAGES.iter().any(|p| name.starts_with(p))
        || is_fiber_class(&name)
        || name == STACK_CLASS_NAME
        || is_java_core(&name))
}

fn is_fiber_class(name: &str) -> bool {
    name == FIBER_CLASS_NAME
        || name
            .strip_prefix(FIBER_CLASS_NAME)
            .is_some_and(|rest| rest.starts_with('$'))
}
