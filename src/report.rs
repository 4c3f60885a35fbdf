use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::database::{CallPoint, ClassDatabase, Classification};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Rewritten { before: String, after: String },
    /// Rejected by the inclusion prefixes.
    Excluded,
    /// Rejected by the fixed name-based exclusions.
    Skipped,
    ToleratedFailure { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassOutcome {
    pub class_name: String,
    pub path: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub build_directory: String,
    pub scanned_classes: usize,
    pub classified_classes: usize,
    pub work_list: Vec<String>,
    pub rewritten: usize,
    pub excluded: usize,
    pub tolerated_failures: usize,
    pub duration_ms: u64,
    pub classes: Vec<ClassOutcome>,
}

impl RunReport {
    pub fn new(build_directory: &Path, database: &ClassDatabase, work_list: Vec<String>) -> Self {
        Self {
            build_directory: build_directory.to_string_lossy().to_string(),
            scanned_classes: database.scanned_files(),
            classified_classes: database.len(),
            work_list,
            rewritten: 0,
            excluded: 0,
            tolerated_failures: 0,
            duration_ms: 0,
            classes: Vec::new(),
        }
    }

    pub fn push(&mut self, class_name: &str, path: &Path, outcome: Outcome) {
        match outcome {
            Outcome::Rewritten { .. } => self.rewritten += 1,
            Outcome::Excluded | Outcome::Skipped => self.excluded += 1,
            Outcome::ToleratedFailure { .. } => self.tolerated_failures += 1,
        }
        self.classes.push(ClassOutcome {
            class_name: class_name.to_string(),
            path: path.to_string_lossy().to_string(),
            outcome,
        });
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("build_directory: {}\n", self.build_directory));
        out.push_str(&format!("scanned_classes: {}\n", self.scanned_classes));
        out.push_str(&format!("classified_classes: {}\n", self.classified_classes));
        out.push_str(&format!("work_list: {}\n", self.work_list.len()));
        out.push_str(&format!("rewritten: {}\n", self.rewritten));
        out.push_str(&format!("excluded: {}\n", self.excluded));
        out.push_str(&format!("tolerated_failures: {}\n", self.tolerated_failures));
        out.push_str(&format!("duration_ms: {}\n", self.duration_ms));
        for c in &self.classes {
            let detail = match &c.outcome {
                Outcome::Rewritten { after, .. } => format!("rewritten ({})", short_hash(after)),
                Outcome::Excluded => "excluded".to_string(),
                Outcome::Skipped => "skipped".to_string(),
                Outcome::ToleratedFailure { reason } => format!("not instrumented: {reason}"),
            };
            out.push_str(&format!("- {}: {detail}\n", c.class_name));
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassSummary {
    pub class_name: String,
    pub path: String,
    pub classification: Classification,
    pub suspendable_methods: Vec<String>,
    pub suspend_points: Vec<CallPoint>,
}

/// Result of a classification-only run.
#[derive(Debug, Clone, Serialize)]
pub struct ClassificationReport {
    pub build_directory: String,
    pub scanned_classes: usize,
    pub classified_classes: usize,
    pub work_list: Vec<String>,
    pub classes: Vec<ClassSummary>,
}

impl ClassificationReport {
    pub fn new(build_directory: &Path, database: &ClassDatabase) -> Self {
        Self {
            build_directory: build_directory.to_string_lossy().to_string(),
            scanned_classes: database.scanned_files(),
            classified_classes: database.len(),
            work_list: database.work_list().into_iter().map(|w| w.name).collect(),
            classes: database
                .entries()
                .map(|e| ClassSummary {
                    class_name: e.name.clone(),
                    path: e.file.path.to_string_lossy().to_string(),
                    classification: e.classification,
                    suspendable_methods: e.suspendable_methods.clone(),
                    suspend_points: e.suspend_points.clone(),
                })
                .collect(),
        }
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("build_directory: {}\n", self.build_directory));
        out.push_str(&format!("scanned_classes: {}\n", self.scanned_classes));
        out.push_str(&format!("classified_classes: {}\n", self.classified_classes));
        out.push_str(&format!("work_list: {}\n", self.work_list.len()));
        for name in &self.work_list {
            out.push_str(&format!("- {name}\n"));
        }
        out
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_bytes_is_sha256_hex() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn outcomes_serialize_with_a_tag() {
        let outcome = ClassOutcome {
            class_name: "com/example/B".to_string(),
            path: "/out/com/example/B.class".to_string(),
            outcome: Outcome::ToleratedFailure {
                reason: "boom".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "tolerated_failure");
        assert_eq!(json["reason"], "boom");
        assert_eq!(json["class_name"], "com/example/B");
    }
}
