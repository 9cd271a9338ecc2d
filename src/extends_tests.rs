#[cfg(test)]
mod tests {

    use crate::error::GuildfileError;
    use crate::loader::Loader;
    use serde_yaml::Value;

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn load(s: &str) -> crate::guildfile::Guildfile {
        Loader::new().for_string(s, None).unwrap()
    }

    #[test]
    fn test_child_inherits_parent_operations() {
        let gf = load(
            "- config: base\n\
             \x20 operations:\n\
             \x20   train:\n\
             \x20     main: train\n\
             - model: m\n\
             \x20 extends: base",
        );
        let model = gf.model("m").unwrap();
        assert!(model.operation("train").is_some());
    }

    #[test]
    fn test_child_values_win() {
        let gf = load(
            "- config: base\n\
             \x20 description: base things\n\
             \x20 operations:\n\
             \x20   train:\n\
             \x20     main: train\n\
             - model: m\n\
             \x20 extends: base\n\
             \x20 description: my model",
        );
        assert_eq!(gf.model("m").unwrap().description, "my model");
    }

    #[test]
    fn test_nested_fill_absent_merge() {
        let gf = load(
            "- config: base\n\
             \x20 operations:\n\
             \x20   train:\n\
             \x20     main: train\n\
             \x20     flags:\n\
             \x20       lr: 0.1\n\
             \x20       epochs: 10\n\
             - model: m\n\
             \x20 extends: base\n\
             \x20 operations:\n\
             \x20   train:\n\
             \x20     flags:\n\
             \x20       lr: 0.01",
        );
        let op = gf.model("m").unwrap().operation("train").unwrap();
        assert_eq!(op.main.as_deref(), Some("train"));
        assert_eq!(op.flag_value("lr"), Some(&yaml("0.01")));
        assert_eq!(op.flag_value("epochs"), Some(&yaml("10")));
    }

    #[test]
    fn test_grandparent_chain() {
        let gf = load(
            "- config: a\n\
             \x20 operations:\n\
             \x20   prepare:\n\
             \x20     main: prepare\n\
             - config: b\n\
             \x20 extends: a\n\
             \x20 operations:\n\
             \x20   train:\n\
             \x20     main: train\n\
             - model: m\n\
             \x20 extends: b",
        );
        let model = gf.model("m").unwrap();
        assert!(model.operation("prepare").is_some());
        assert!(model.operation("train").is_some());
    }

    #[test]
    fn test_multiple_parents_first_wins() {
        let gf = load(
            "- config: a\n\
             \x20 description: from a\n\
             - config: b\n\
             \x20 description: from b\n\
             - model: m\n\
             \x20 extends: [a, b]",
        );
        assert_eq!(gf.model("m").unwrap().description, "from a");
    }

    #[test]
    fn test_inherited_templates_resolve_in_child_scope() {
        let gf = load(
            "- config: base\n\
             \x20 params:\n\
             \x20   depth: 1\n\
             \x20 operations:\n\
             \x20   train:\n\
             \x20     main: 'train --depth {{depth}}'\n\
             - model: m\n\
             \x20 extends: base\n\
             \x20 params:\n\
             \x20   depth: 4",
        );
        let op = gf.model("m").unwrap().operation("train").unwrap();
        assert_eq!(op.main.as_deref(), Some("train --depth 4"));
    }

    #[test]
    fn test_undefined_parent_is_error() {
        let err = Loader::new()
            .for_string("- model: m\n  extends: nope", None)
            .unwrap_err();
        assert!(matches!(err, GuildfileError::Reference { .. }));
        assert!(err.to_string().contains("undefined model or config 'nope'"));
    }

    #[test]
    fn test_extends_cycle_is_error() {
        let err = Loader::new()
            .for_string(
                "- config: x\n\
                 \x20 extends: y\n\
                 - config: y\n\
                 \x20 extends: x\n\
                 - model: m\n\
                 \x20 extends: x",
                None,
            )
            .unwrap_err();
        let GuildfileError::Cycle { chain, .. } = err else {
            panic!("expected cycle error, got {err}");
        };
        assert_eq!(chain, vec!["x", "y", "x"]);
    }

    #[test]
    fn test_self_extends_is_cycle() {
        let err = Loader::new()
            .for_string(
                "- config: x\n\
                 \x20 extends: x\n\
                 - model: m\n\
                 \x20 extends: x",
                None,
            )
            .unwrap_err();
        assert!(matches!(err, GuildfileError::Cycle { .. }));
    }
}
