//! Spec §8 round-trip property: `Parse(Canonical(Space)) == Space`.
//! `Space` has no `PartialEq`, so the check compares canonical strings —
//! which is itself the equality the property is stated in terms of.

use orion::SpaceBuilder;

#[test]
fn canonical_string_is_stable_through_a_parse_and_rebuild_cycle() {
    let tokens = vec![
        "--lr~loguniform(1e-5,1)".to_owned(),
        "--momentum~uniform(0,1)".to_owned(),
        "--optimizer~choices[sgd,adam,rmsprop]".to_owned(),
        "--epoch~fidelity(1,100,4)".to_owned(),
        "--config path/to/config.yaml".to_owned(),
    ];
    let (space, _template) = SpaceBuilder::build(&tokens).unwrap();
    let canonical = space.canonical();

    let rebuild_tokens: Vec<String> = canonical.split_whitespace().map(str::to_owned).collect();
    let (rebuilt, _) = SpaceBuilder::build(&rebuild_tokens).unwrap();

    assert_eq!(rebuilt.canonical(), canonical);
    assert_eq!(rebuilt.len(), space.len());
}
