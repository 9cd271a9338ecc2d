#[cfg(test)]
mod tests {

    use crate::params::{resolve_refs, resolved_params};
    use serde_yaml::{Mapping, Value};

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn model_data(s: &str) -> Mapping {
        serde_yaml::from_str(s).unwrap()
    }

    #[test]
    fn test_simple_substitution() {
        let data = model_data("params:\n  data: data.csv");
        let params = resolved_params(&data);
        let resolved = resolve_refs(yaml("main: train --data {{data}}"), &params);
        assert_eq!(resolved, yaml("main: train --data data.csv"));
    }

    #[test]
    fn test_single_token_preserves_type() {
        let data = model_data("params:\n  batch: 32");
        let params = resolved_params(&data);
        let resolved = resolve_refs(yaml("'{{batch}}'"), &params);
        assert_eq!(resolved, yaml("32"));
        assert!(resolved.as_i64().is_some());
    }

    #[test]
    fn test_mixed_string_joins_stringified_parts() {
        let data = model_data("params:\n  n: 3\n  unit: epochs");
        let params = resolved_params(&data);
        let resolved = resolve_refs(yaml("'run for {{n}} {{unit}}'"), &params);
        assert_eq!(resolved, yaml("run for 3 epochs"));
    }

    #[test]
    fn test_chained_params() {
        let data = model_data(
            "params:\n  root: /data\n  dir: '{{root}}/mnist'\n  file: '{{dir}}/train.csv'",
        );
        let params = resolved_params(&data);
        assert_eq!(params.get("dir").unwrap(), &yaml("/data/mnist"));
        assert_eq!(params.get("file").unwrap(), &yaml("/data/mnist/train.csv"));
    }

    #[test]
    fn test_unknown_name_stays_literal() {
        let params = resolved_params(&model_data("params: {}"));
        let resolved = resolve_refs(yaml("'{{nope}}'"), &params);
        assert_eq!(resolved, yaml("'{{nope}}'"));
    }

    #[test]
    fn test_cycle_terminates() {
        let data = model_data("params:\n  a: '{{b}}'\n  b: '{{a}}'");
        // Must not hang; the seen-set cuts the loop and the last computed
        // value wins.
        let params = resolved_params(&data);
        assert!(params.get("a").is_some());
        assert!(params.get("b").is_some());
    }

    #[test]
    fn test_self_reference_terminates() {
        let data = model_data("params:\n  a: 'x {{a}}'");
        let params = resolved_params(&data);
        assert!(params.get("a").unwrap().as_str().unwrap().starts_with("x "));
    }

    #[test]
    fn test_non_string_params_pass_through() {
        let data = model_data("params:\n  n: 3\n  opts: [a, b]");
        let params = resolved_params(&data);
        assert_eq!(params.get("n").unwrap(), &yaml("3"));
        assert_eq!(params.get("opts").unwrap(), &yaml("[a, b]"));
    }

    #[test]
    fn test_substitution_reaches_nested_values() {
        let data = model_data("params:\n  lr: 0.1");
        let params = resolved_params(&data);
        let resolved = resolve_refs(
            yaml("operations:\n  train:\n    flags:\n      lr:\n        default: '{{lr}}'"),
            &params,
        );
        assert_eq!(
            resolved,
            yaml("operations:\n  train:\n    flags:\n      lr:\n        default: 0.1")
        );
    }

    #[test]
    fn test_no_params_table_is_empty() {
        assert!(resolved_params(&model_data("model: m")).is_empty());
    }
}
