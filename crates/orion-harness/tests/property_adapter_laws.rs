//! Spec §8 invariant: for every adapter `A`, `A.backward(A.forward(t)) == t`
//! whenever `forward` does not filter the trial out. Exercises the law
//! against randomly generated names and values rather than the fixed cases
//! already covered in `orion-adapters`'s own unit tests.

use orion_adapters::Adapter;
use orion_trial::{Param, Trial};
use orion_types::{ParamKind, Value};
use proptest::prelude::*;

fn trial_with(name: &str, value: f64) -> Trial {
    Trial::new("exp", vec![Param { name: name.to_owned(), kind: ParamKind::Real, value: Value::Real(value) }])
}

proptest! {
    #[test]
    fn renaming_is_its_own_inverse(old in "[a-z]{1,8}", new in "[a-z]{1,8}", value in -1e6_f64..1e6_f64) {
        prop_assume!(old != new);
        let adapter = Adapter::DimensionRenaming { old: old.clone(), new: new.clone() };
        let t = trial_with(&old, value);
        let forward = adapter.forward(&t);
        prop_assert_eq!(forward.len(), 1);
        let back = adapter.backward(&forward[0]);
        prop_assert_eq!(back, vec![t]);
    }

    #[test]
    fn addition_and_deletion_are_inverses_for_any_name_and_default(
        name in "[a-z]{1,8}",
        base_value in -1e6_f64..1e6_f64,
        default_value in -1e6_f64..1e6_f64,
    ) {
        let adapter = Adapter::DimensionAddition { name: name.clone(), default: Value::Real(default_value), kind: ParamKind::Real };
        let t = trial_with("existing", base_value);
        let forward = adapter.forward(&t);
        prop_assert_eq!(forward.len(), 1);
        let back = adapter.backward(&forward[0]);
        prop_assert_eq!(back, vec![t]);
    }
}
