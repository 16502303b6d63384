//! Array-side naming and provisioning policy.
//!
//! Every array object the driver owns is discovered by a name derived from
//! the orchestrator identifier, so these functions are the only place the
//! naming convention lives.

use crate::volume::VolumeType;

/// Maximum length of a derived host name.
pub const HOST_NAME_MAX_LEN: usize = 32;

/// Name of the retention policy applied to every snapshot and view.
pub const RETENTION_POLICY_NAME: &str = "Best_Effort_Retention";

/// Extra-spec key selecting the provisioning type of a volume.
pub const THIN_PROV_TYPE_KEY: &str = "kaminario:thin_prov_type";

/// Extra-spec value disabling deduplication.
pub const NO_DEDUP: &str = "nodedup";

/// Returns the name of the volume group enclosing volume `volume_id`.
#[must_use]
pub fn volume_group_name(volume_id: &str) -> String {
    format!("cvg-{volume_id}")
}

/// Returns the array name of volume `volume_id`.
#[must_use]
pub fn volume_name(volume_id: &str) -> String {
    format!("cv-{volume_id}")
}

/// Returns the short name of snapshot `snapshot_id`.
#[must_use]
pub fn snapshot_name(snapshot_id: &str) -> String {
    format!("cs-{snapshot_id}")
}

/// Returns the name of the temporary view used to restore into `volume_id`.
#[must_use]
pub fn view_name(volume_id: &str) -> String {
    format!("cview-{volume_id}")
}

/// Derives the array host name from a connector host string.
///
/// Characters outside `[0-9a-zA-Z_-]` become `_` and the result is cut to
/// [`HOST_NAME_MAX_LEN`] characters.
#[must_use]
pub fn host_name(connector_host: &str) -> String {
    connector_host
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .take(HOST_NAME_MAX_LEN)
        .collect()
}

/// Returns whether a volume of `volume_type` is deduplicated.
///
/// Volumes are deduplicated unless their type explicitly opts out.
#[must_use]
pub fn is_dedup(volume_type: Option<&VolumeType>) -> bool {
    volume_type
        .and_then(|kind| kind.extra_spec(THIN_PROV_TYPE_KEY))
        .is_none_or(|value| value != NO_DEDUP)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn names_for_one_id_are_distinct() {
        let id = "42";
        let names = [
            volume_group_name(id),
            volume_name(id),
            snapshot_name(id),
            view_name(id),
        ];
        for (index, name) in names.iter().enumerate() {
            assert!(name.ends_with(id));
            assert!(
                names.iter().skip(index + 1).all(|other| other != name),
                "{name} collides"
            );
        }
    }

    #[rstest]
    #[case("compute-01", "compute-01")]
    #[case("node.example.com", "node_example_com")]
    #[case("host name/with:odd", "host_name_with_odd")]
    #[case("", "")]
    #[case("ünïcode", "_n_code")]
    fn host_name_replaces_foreign_characters(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(host_name(input), expected);
    }

    #[rstest]
    #[case("a")]
    #[case("a.very.long.host.name.inside.some.datacenter.example.com")]
    #[case("exactly-thirty-two-characters-xx")]
    fn host_name_is_bounded_and_idempotent(#[case] input: &str) {
        let once = host_name(input);
        assert!(once.chars().count() <= HOST_NAME_MAX_LEN);
        assert_eq!(host_name(&once), once);
    }

    #[rstest]
    #[case(None, true)]
    #[case(Some(VolumeType::default()), true)]
    #[case(Some(VolumeType::default().with_extra_spec(THIN_PROV_TYPE_KEY, "dedup")), true)]
    #[case(Some(VolumeType::default().with_extra_spec(THIN_PROV_TYPE_KEY, NO_DEDUP)), false)]
    #[case(Some(VolumeType::default().with_extra_spec("thin_prov_type", NO_DEDUP)), true)]
    fn dedup_is_on_unless_type_opts_out(
        #[case] volume_type: Option<VolumeType>,
        #[case] expected: bool,
    ) {
        assert_eq!(is_dedup(volume_type.as_ref()), expected);
    }
}
