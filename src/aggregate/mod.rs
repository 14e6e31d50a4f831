use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::ingest::record::MemberRecord;

/// One collection agency and every member assigned to it, in the order the
/// members appeared in the file.
///
/// `needs_lookup` always mirrors `agency_email.is_none()`; it is recomputed
/// whenever the email changes, not set once at creation.
#[derive(Debug, Clone, Serialize)]
pub struct AgencyGroup {
    pub agency_name: String,
    pub agency_email: Option<String>,
    pub needs_lookup: bool,
    pub members: Vec<MemberRecord>,
}

/// Aggregation state for one ingestion: a single owned mapping from agency
/// name to its group. Keys are exact strings — names differing in case or
/// whitespace form distinct groups.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct AgencyGroups {
    groups: BTreeMap<String, AgencyGroup>,
}

impl AgencyGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one valid record in. Records for a known agency append to its
    /// member list; the group's contact email follows first-non-empty-wins:
    /// a later record may fill a missing email, but never replaces one that
    /// is already set, even with a different address.
    pub fn fold(&mut self, record: MemberRecord) {
        match self.groups.entry(record.agency_name.clone()) {
            Entry::Vacant(slot) => {
                let agency_email = record.agency_email.clone();
                slot.insert(AgencyGroup {
                    agency_name: record.agency_name.clone(),
                    needs_lookup: agency_email.is_none(),
                    agency_email,
                    members: vec![record],
                });
            }
            Entry::Occupied(mut slot) => {
                let group = slot.get_mut();
                if group.agency_email.is_none() {
                    if let Some(email) = &record.agency_email {
                        group.agency_email = Some(email.clone());
                    }
                }
                group.needs_lookup = group.agency_email.is_none();
                group.members.push(record);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get(&self, agency_name: &str) -> Option<&AgencyGroup> {
        self.groups.get(agency_name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AgencyGroup)> {
        self.groups.iter()
    }

    pub fn values(&self) -> impl Iterator<Item = &AgencyGroup> {
        self.groups.values()
    }
}
