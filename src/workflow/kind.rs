//! Request kinds and their static configuration

use serde::{Deserialize, Serialize};

use crate::models::RequestFields;

/// Closed set of request categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    BcpClearance,
    IpptBooking,
    Rso,
    ReportSick,
    Mc,
    Enquiry,
}

/// Per-kind schema and approval policy
#[derive(Debug)]
pub struct KindProfile {
    /// Name shown to users, e.g. "BCP clearance"
    pub label: &'static str,
    /// Field names in display order, each with its display label
    pub fields: &'static [(&'static str, &'static str)],
    /// Informational kinds never show action buttons
    pub requires_approval: bool,
    /// Acknowledgement and the verdict are separate steps
    pub requires_independent_approval: bool,
    /// Appended to the submission receipt
    pub completion_note: Option<&'static str>,
}

const BCP_CLEARANCE: KindProfile = KindProfile {
    label: "BCP clearance",
    fields: &[
        ("rank_name", "Rank/name"),
        ("time", "Clearance date and time"),
        ("purpose", "Purpose"),
        ("additional_info", "Additional info"),
    ],
    requires_approval: true,
    requires_independent_approval: true,
    completion_note: None,
};

const IPPT_BOOKING: KindProfile = KindProfile {
    label: "IPPT booking",
    fields: &[
        ("rank_name", "Rank/name"),
        ("time", "Date and time"),
        ("participants", "Participants"),
        ("additional_info", "Additional info"),
    ],
    requires_approval: true,
    requires_independent_approval: true,
    completion_note: None,
};

const RSO: KindProfile = KindProfile {
    label: "RSO",
    fields: &[
        ("rank_name", "Rank/name"),
        ("location", "Location"),
        ("time", "Date and time"),
        ("reason", "Reason"),
        ("additional_info", "Additional info"),
    ],
    requires_approval: true,
    requires_independent_approval: false,
    completion_note: None,
};

const REPORT_SICK: KindProfile = KindProfile {
    label: "report sick notification",
    fields: &[
        ("rank_name", "Rank/name"),
        ("location", "Location"),
        ("time", "Date and time"),
        ("reason", "Reason"),
        ("course", "Course"),
        ("additional_info", "Additional info"),
    ],
    requires_approval: true,
    requires_independent_approval: false,
    completion_note: Some("Do remember to update the movement charts as well."),
};

const MC: KindProfile = KindProfile {
    label: "MC",
    fields: &[
        ("rank_name", "Rank/name"),
        ("duration", "Duration"),
        ("reason", "Reason"),
        ("additional_info", "Additional info"),
    ],
    requires_approval: true,
    requires_independent_approval: false,
    completion_note: None,
};

const ENQUIRY: KindProfile = KindProfile {
    label: "enquiry",
    fields: &[("enquiry", "Enquiry")],
    requires_approval: false,
    requires_independent_approval: false,
    completion_note: Some("Your enquiry has been forwarded to the SDOs. A reply will arrive soon."),
};

impl RequestKind {
    pub const ALL: [RequestKind; 6] = [
        RequestKind::BcpClearance,
        RequestKind::IpptBooking,
        RequestKind::Rso,
        RequestKind::ReportSick,
        RequestKind::Mc,
        RequestKind::Enquiry,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::BcpClearance => "bcp_clearance",
            RequestKind::IpptBooking => "ippt_booking",
            RequestKind::Rso => "rso",
            RequestKind::ReportSick => "report_sick",
            RequestKind::Mc => "mc",
            RequestKind::Enquiry => "enquiry",
        }
    }

    pub fn profile(&self) -> &'static KindProfile {
        match self {
            RequestKind::BcpClearance => &BCP_CLEARANCE,
            RequestKind::IpptBooking => &IPPT_BOOKING,
            RequestKind::Rso => &RSO,
            RequestKind::ReportSick => &REPORT_SICK,
            RequestKind::Mc => &MC,
            RequestKind::Enquiry => &ENQUIRY,
        }
    }

    pub fn label(&self) -> &'static str {
        self.profile().label
    }

    pub fn requires_approval(&self) -> bool {
        self.profile().requires_approval
    }

    pub fn requires_independent_approval(&self) -> bool {
        self.profile().requires_independent_approval
    }

    /// Verb used for a positive verdict: "approved" or "acknowledged"
    pub fn approval_verb(&self) -> &'static str {
        if self.requires_independent_approval() {
            "approved"
        } else {
            "acknowledged"
        }
    }

    /// Render fields in schema order; fields outside the schema follow by name
    pub fn summarize(&self, fields: &RequestFields) -> String {
        let profile = self.profile();
        let mut lines = Vec::with_capacity(fields.len());

        for (name, label) in profile.fields {
            if let Some(value) = fields.get(name) {
                lines.push(format!("{}: {}", label, value.render()));
            }
        }
        for field in fields.iter() {
            if !profile.fields.iter().any(|(name, _)| *name == field.name) {
                lines.push(format!("{}: {}", field.name, field.value.render()));
            }
        }

        lines.join("\n")
    }
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Invalid request kind: {}", s))
    }
}
