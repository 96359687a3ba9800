//! Workload metadata table
//!
//! One static row per workload variant: CLI name, anomaly code in the
//! Berenson et al. / Adya notation, and operator guidance.

use std::fmt;
use std::str::FromStr;

use isoprobe_core::Error;
use serde::{Deserialize, Serialize};

use super::{
    LostUpdate, NonRepeatableRead, PhantomRead, ReadSkew, Workload, WorkloadContext, WriteSkew,
};

/// Workload variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    /// P4 lost update
    LostUpdate,
    /// A5A read skew
    ReadSkew,
    /// A5B write skew
    WriteSkew,
    /// P2 non-repeatable read
    NonRepeatableRead,
    /// P3 phantom read
    PhantomRead,
}

struct Metadata {
    name: &'static str,
    anomaly: &'static str,
    title: &'static str,
    note: &'static str,
}

const METADATA: [Metadata; 5] = [
    Metadata {
        name: "lost_update",
        anomaly: "P4",
        title: "lost update",
        note: "bank account transfers exposed to (P4) lost update. Options --sfu or --cas required for correct execution in RC.",
    },
    Metadata {
        name: "read_skew",
        anomaly: "A5A",
        title: "read skew",
        note: "bank account transfers exposed to (A5A) read skew. Option --sfu or isolation RR required for correct execution.",
    },
    Metadata {
        name: "write_skew",
        anomaly: "A5B",
        title: "write skew",
        note: "constrained account pairs exposed to (A5B) write skew. Option --cas or serializable isolation required for correct execution.",
    },
    Metadata {
        name: "non_repeatable_read",
        anomaly: "P2",
        title: "non-repeatable read",
        note: "repeated balance reads exposed to (P2) non-repeatable read. Option --lock for_share or isolation RR required for correct execution.",
    },
    Metadata {
        name: "phantom_read",
        anomaly: "P3",
        title: "phantom read",
        note: "repeated predicate reads exposed to (P3) phantom read. Isolation RR or higher required for correct execution.",
    },
];

impl WorkloadType {
    /// Every workload variant, in table order
    pub const ALL: [WorkloadType; 5] = [
        WorkloadType::LostUpdate,
        WorkloadType::ReadSkew,
        WorkloadType::WriteSkew,
        WorkloadType::NonRepeatableRead,
        WorkloadType::PhantomRead,
    ];

    fn metadata(self) -> &'static Metadata {
        &METADATA[self as usize]
    }

    /// CLI name
    pub fn name(self) -> &'static str {
        self.metadata().name
    }

    /// Anomaly code (P2, P3, P4, A5A, A5B)
    pub fn anomaly(self) -> &'static str {
        self.metadata().anomaly
    }

    /// Human-readable anomaly name
    pub fn title(self) -> &'static str {
        self.metadata().title
    }

    /// Operator guidance
    pub fn note(self) -> &'static str {
        self.metadata().note
    }

    /// Instantiate the workload
    pub fn create(self, ctx: WorkloadContext) -> Box<dyn Workload> {
        match self {
            WorkloadType::LostUpdate => Box::new(LostUpdate::new(ctx)),
            WorkloadType::ReadSkew => Box::new(ReadSkew::new(ctx)),
            WorkloadType::WriteSkew => Box::new(WriteSkew::new(ctx)),
            WorkloadType::NonRepeatableRead => Box::new(NonRepeatableRead::new(ctx)),
            WorkloadType::PhantomRead => Box::new(PhantomRead::new(ctx)),
        }
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for WorkloadType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        WorkloadType::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized || kind.anomaly().eq_ignore_ascii_case(&normalized))
            .ok_or_else(|| {
                let names: Vec<&str> = WorkloadType::ALL.iter().map(|k| k.name()).collect();
                Error::InvalidConfig(format!(
                    "unknown workload '{}', expected one of: {}",
                    s,
                    names.join(", ")
                ))
            })
    }
}
