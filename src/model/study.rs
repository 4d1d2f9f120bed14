use std::collections::{BTreeMap, BTreeSet};

use super::DicomMetadata;

/// Records partitioned by Study Instance UID.
pub type StudyGroups = BTreeMap<String, Vec<DicomMetadata>>;

pub fn group_by_study(records: &[DicomMetadata]) -> StudyGroups {
    let mut groups = StudyGroups::new();
    for record in records {
        groups
            .entry(record.study_instance_uid.clone())
            .or_default()
            .push(record.clone());
    }
    groups
}

/// Number of distinct Series Instance UIDs among `records`.
pub fn series_count(records: &[DicomMetadata]) -> usize {
    records
        .iter()
        .map(|record| record.series_instance_uid.as_str())
        .collect::<BTreeSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::metadata::RawAttributes;
    use std::path::PathBuf;

    fn record(study: &str, series: &str, file: &str) -> DicomMetadata {
        DicomMetadata::from_raw(
            RawAttributes {
                study_instance_uid: study.into(),
                series_instance_uid: series.into(),
                ..RawAttributes::default()
            },
            PathBuf::from(file),
        )
    }

    #[test]
    fn grouping_is_a_partition() {
        let records = vec![
            record("1.1", "1.1.1", "a"),
            record("2.2", "2.2.1", "b"),
            record("1.1", "1.1.2", "c"),
            record("1.1", "1.1.1", "d"),
        ];
        let groups = group_by_study(&records);

        assert_eq!(groups.len(), 2);
        assert_eq!(groups.values().map(Vec::len).sum::<usize>(), records.len());
        for (study, members) in &groups {
            assert!(members.iter().all(|m| &m.study_instance_uid == study));
        }
        for record in &records {
            let owners = groups
                .values()
                .filter(|members| members.contains(record))
                .count();
            assert_eq!(owners, 1);
        }

        assert_eq!(series_count(&groups["1.1"]), 2);
        assert_eq!(series_count(&groups["2.2"]), 1);
    }

    #[test]
    fn duplicates_are_not_collapsed() {
        let records = vec![record("1", "1.1", "a"), record("1", "1.1", "a")];
        let groups = group_by_study(&records);
        assert_eq!(groups["1"].len(), 2);
        assert_eq!(series_count(&groups["1"]), 1);
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_by_study(&[]).is_empty());
        assert_eq!(series_count(&[]), 0);
    }
}
