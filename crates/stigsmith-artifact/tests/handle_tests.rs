use proptest::prelude::*;
use stigsmith_artifact::inspec::parse_controls;
use stigsmith_artifact::{BaselineHandle, BaselineKind, ContentHash, ControlEntry, ControlId};

fn control_ids() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::btree_set("V-[0-9]{6}", 1..12).prop_map(|s| s.into_iter().collect())
}

fn stub_from(ids: &[String]) -> BaselineHandle {
    BaselineHandle::new(
        "prop-baseline",
        "artifacts/generated/prop",
        BaselineKind::Stub,
        ids.iter().map(|id| ControlEntry::stub(id.as_str(), "desc")).collect(),
    )
}

#[test]
fn test_profile_parses_into_entries() {
    let profile = "\
control 'V-1' do
  title 'first'
end

control \"V-2\" do
  title \"second\"
  describe service('sshd') do
    it { should be_running }
  end
end
";
    let entries: Vec<ControlEntry> = parse_controls(profile)
        .into_iter()
        .map(|c| c.into_entry())
        .collect();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].id, ControlId::new("V-2"));
    assert_eq!(entries[1].description, "second");
    assert!(entries[1].is_implemented());
}

proptest! {
    #[test]
    fn prop_revise_preserves_control_set(ids in control_ids(), pick in any::<proptest::sample::Index>()) {
        let stub = stub_from(&ids);
        let target = pick.get(&ids).clone();
        let revised = stub.revise(
            BaselineKind::Implemented,
            vec![ControlEntry::implemented(target.as_str(), "desc", "control 'x' do\nend")],
        );

        prop_assert_eq!(revised.controls.len(), ids.len());
        prop_assert_eq!(revised.implemented_count(), 1);
        prop_assert_eq!(stub.implemented_count(), 0);
        prop_assert_ne!(revised.digest, stub.digest);
    }

    #[test]
    fn prop_digest_is_deterministic(ids in control_ids()) {
        prop_assert_eq!(stub_from(&ids).digest, stub_from(&ids).digest);
    }

    #[test]
    fn prop_content_hash_hex_parses_back(bytes in any::<[u8; 32]>()) {
        let hash = ContentHash::new(bytes);
        let parsed: ContentHash = hash.to_string().parse().unwrap();
        prop_assert_eq!(parsed, hash);
    }

    #[test]
    fn prop_control_id_ignores_padding(id in "V-[0-9]{1,6}", pad in " {0,3}") {
        prop_assert_eq!(ControlId::new(format!("{pad}{id}{pad}")), ControlId::new(id));
    }
}
