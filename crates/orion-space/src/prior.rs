//! Prior parsing and canonical printing (spec §3, Dimension invariant:
//! "a dimension's canonical string form round-trips through parsing").

use orion_error::{OrionError, Result};
use orion_types::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Prior {
    Uniform { low: f64, high: f64 },
    LogUniform { low: f64, high: f64 },
    Normal { mu: f64, sigma: f64 },
    Choices(Vec<Value>),
    Fidelity { min: f64, max: f64, base: f64 },
}

impl Prior {
    #[must_use]
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Prior::Uniform { low, high } | Prior::Fidelity { min: low, max: high, .. } => {
                value.as_real().is_some_and(|v| v >= *low && v <= *high)
            }
            Prior::LogUniform { low, high } => value
                .as_real()
                .is_some_and(|v| v > 0.0 && v >= *low && v <= *high),
            Prior::Normal { .. } => value.as_real().is_some(),
            Prior::Choices(choices) => choices.contains(value),
        }
    }

    #[must_use]
    pub fn sample(&self, rng: &mut impl rand::Rng) -> Value {
        match self {
            Prior::Uniform { low, high } => Value::Real(rng.gen_range(*low..=*high)),
            Prior::LogUniform { low, high } => {
                let (lo, hi) = (low.ln(), high.ln());
                Value::Real(rng.gen_range(lo..=hi).exp())
            }
            Prior::Normal { mu, sigma } => {
                // Box-Muller; avoids pulling in rand_distr for one prior kind.
                let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
                let u2: f64 = rng.r#gen();
                let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
                Value::Real(mu + sigma * z)
            }
            Prior::Choices(choices) => {
                let idx = rng.gen_range(0..choices.len());
                choices[idx].clone()
            }
            Prior::Fidelity { base, max, .. } => {
                // Fidelity dimensions sample at the cheapest rung; the
                // algorithm is responsible for driving them upward.
                let _ = max;
                Value::Real(*base)
            }
        }
    }

    /// Parse the `name(args)` / `choices[...]` form from spec §3 and §6.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if let Some(rest) = text.strip_prefix("choices") {
            let rest = rest.trim();
            let inner = strip_delims(rest, '[', ']')
                .or_else(|| strip_delims(rest, '(', ')'))
                .ok_or_else(|| OrionError::invalid_definition(format!("unparseable prior: {text}")))?;
            let choices = split_args(inner)
                .into_iter()
                .map(parse_choice_value)
                .collect();
            return Ok(Prior::Choices(choices));
        }
        let (name, inner) = text
            .split_once('(')
            .ok_or_else(|| OrionError::invalid_definition(format!("unparseable prior: {text}")))?;
        let inner = inner
            .strip_suffix(')')
            .ok_or_else(|| OrionError::invalid_definition(format!("unparseable prior: {text}")))?;
        let args = split_args(inner);
        let parse_f64 = |s: &str| -> Result<f64> {
            s.trim()
                .parse::<f64>()
                .map_err(|_| OrionError::invalid_definition(format!("bad numeric argument: {s}")))
        };
        match name.trim() {
            "uniform" => {
                let [low, high] = take2(&args, text)?;
                Ok(Prior::Uniform { low: parse_f64(low)?, high: parse_f64(high)? })
            }
            "loguniform" => {
                let [low, high] = take2(&args, text)?;
                Ok(Prior::LogUniform { low: parse_f64(low)?, high: parse_f64(high)? })
            }
            "normal" => {
                let [mu, sigma] = take2(&args, text)?;
                Ok(Prior::Normal { mu: parse_f64(mu)?, sigma: parse_f64(sigma)? })
            }
            "fidelity" => {
                if args.len() != 3 {
                    return Err(OrionError::invalid_definition(format!(
                        "fidelity requires 3 arguments: {text}"
                    )));
                }
                Ok(Prior::Fidelity {
                    min: parse_f64(args[0])?,
                    max: parse_f64(args[1])?,
                    base: parse_f64(args[2])?,
                })
            }
            other => Err(OrionError::invalid_definition(format!("unknown prior kind: {other}"))),
        }
    }
}

fn take2<'a>(args: &[&'a str], text: &str) -> Result<[&'a str; 2]> {
    if args.len() != 2 {
        return Err(OrionError::invalid_definition(format!(
            "expected 2 arguments: {text}"
        )));
    }
    Ok([args[0], args[1]])
}

fn strip_delims(s: &str, open: char, close: char) -> Option<&str> {
    let s = s.strip_prefix(open)?;
    s.strip_suffix(close)
}

fn split_args(inner: &str) -> Vec<&str> {
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner.split(',').map(str::trim).collect()
}

fn parse_choice_value(raw: &str) -> Value {
    let raw = raw.trim().trim_matches('\'').trim_matches('"');
    if let Ok(i) = raw.parse::<i64>() {
        Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Real(f)
    } else {
        Value::Categorical(raw.to_owned())
    }
}

impl fmt::Display for Prior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prior::Uniform { low, high } => write!(f, "uniform({low},{high})"),
            Prior::LogUniform { low, high } => write!(f, "loguniform({low},{high})"),
            Prior::Normal { mu, sigma } => write!(f, "normal({mu},{sigma})"),
            Prior::Fidelity { min, max, base } => write!(f, "fidelity({min},{max},{base})"),
            Prior::Choices(choices) => {
                write!(f, "choices[")?;
                for (i, c) in choices.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{c}")?;
                }
                write!(f, "]")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_roundtrips() {
        let p = Prior::parse("uniform(1e-5,1)").unwrap();
        assert_eq!(p, Prior::Uniform { low: 1e-5, high: 1.0 });
        assert_eq!(p.to_string(), "uniform(0.00001,1)");
    }

    #[test]
    fn loguniform_roundtrips() {
        let p = Prior::parse("loguniform(1e-5,1)").unwrap();
        assert_eq!(Prior::parse(&p.to_string()).unwrap(), p);
    }

    #[test]
    fn choices_bracket_form() {
        let p = Prior::parse("choices[sgd,adam,rmsprop]").unwrap();
        assert_eq!(
            p,
            Prior::Choices(vec![
                Value::Categorical("sgd".into()),
                Value::Categorical("adam".into()),
                Value::Categorical("rmsprop".into()),
            ])
        );
    }

    #[test]
    fn contains_respects_bounds() {
        let p = Prior::Uniform { low: 0.0, high: 1.0 };
        assert!(p.contains(&Value::Real(0.5)));
        assert!(!p.contains(&Value::Real(1.5)));
    }

    #[test]
    fn unparseable_prior_is_invalid_definition() {
        let err = Prior::parse("not-a-prior").unwrap_err();
        assert!(matches!(err, OrionError::InvalidDefinition { .. }));
    }
}
