#[cfg(test)]
mod tests {

    use crate::coerce::{
        flag_data, flags_import, guildfile_data, operation, output_capture, select_files,
        string_or_list,
    };
    use serde_yaml::{Mapping, Value};

    fn yaml(s: &str) -> Value {
        serde_yaml::from_str(s).unwrap()
    }

    fn get<'a>(map: &'a Mapping, key: &str) -> &'a Value {
        map.get(key).unwrap()
    }

    #[test]
    fn test_null_document_is_empty() {
        let items = guildfile_data(Value::Null, "test").unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_mapping_document_becomes_anonymous_model() {
        let items = guildfile_data(yaml("train: train.py"), "test").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(get(&items[0], "model"), &yaml("''"));
        let Value::Mapping(ops) = get(&items[0], "operations") else {
            panic!("expected operations mapping");
        };
        assert_eq!(get(ops, "train"), &yaml("main: train.py"));
    }

    #[test]
    fn test_list_item_with_operations_gets_anonymous_model() {
        let items = guildfile_data(
            yaml("- operations:\n    train: train.py"),
            "test",
        )
        .unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(get(&items[0], "model"), &yaml("''"));
    }

    #[test]
    fn test_list_item_with_model_keeps_model() {
        let items = guildfile_data(
            yaml("- model: mnist\n  operations:\n    train: train.py"),
            "test",
        )
        .unwrap();
        assert_eq!(get(&items[0], "model"), &yaml("mnist"));
    }

    #[test]
    fn test_scalar_document_is_error() {
        let err = guildfile_data(yaml("123"), "test").unwrap_err();
        assert!(err.to_string().contains("expected a mapping"));
    }

    #[test]
    fn test_operation_string_becomes_main() {
        let op = operation("train", yaml("train.py --fast"), "test").unwrap();
        assert_eq!(op, yaml("main: train.py --fast"));
    }

    #[test]
    fn test_operation_include_passes_through() {
        let op = operation("$include", yaml("shared:train"), "test").unwrap();
        assert_eq!(op, yaml("shared:train"));
    }

    #[test]
    fn test_flag_scalar_becomes_default() {
        assert_eq!(flag_data("lr", yaml("0.1"), "test").unwrap(), yaml("default: 0.1"));
        assert_eq!(
            flag_data("batch", yaml("[32, 64]"), "test").unwrap(),
            yaml("default: [32, 64]")
        );
        assert_eq!(flag_data("x", Value::Null, "test").unwrap(), yaml("default: null"));
    }

    #[test]
    fn test_flag_mapping_passes_through() {
        let data = yaml("default: 0.1\ndescription: learning rate");
        assert_eq!(flag_data("lr", data.clone(), "test").unwrap(), data);
    }

    #[test]
    fn test_flags_import_forms() {
        assert_eq!(flags_import(yaml("yes"), "test").unwrap(), Value::Bool(true));
        assert_eq!(flags_import(yaml("all"), "test").unwrap(), Value::Bool(true));
        assert_eq!(flags_import(yaml("no"), "test").unwrap(), yaml("[]"));
        assert_eq!(flags_import(yaml("[a, b]"), "test").unwrap(), yaml("[a, b]"));
        assert!(flags_import(yaml("123"), "test").is_err());
    }

    #[test]
    fn test_output_capture_string_becomes_list() {
        assert_eq!(
            output_capture(yaml("'loss: (\\d+)'"), "test").unwrap(),
            yaml("['loss: (\\d+)']")
        );
        assert_eq!(output_capture(yaml("no"), "test").unwrap(), yaml("[]"));
    }

    #[test]
    fn test_select_files_string() {
        assert_eq!(
            select_files(yaml("'*.py'"), "test").unwrap(),
            yaml("[{exclude: '*'}, {include: '*.py'}]")
        );
    }

    #[test]
    fn test_select_files_string_list_gets_exclude_all() {
        assert_eq!(
            select_files(yaml("['*.py', '*.yml']"), "test").unwrap(),
            yaml("[{exclude: '*'}, {include: '*.py'}, {include: '*.yml'}]")
        );
    }

    #[test]
    fn test_select_files_mixed_list_kept_as_is() {
        assert_eq!(
            select_files(yaml("[{exclude: data}, '*.py']"), "test").unwrap(),
            yaml("[{exclude: data}, {include: '*.py'}]")
        );
    }

    #[test]
    fn test_select_files_disabled() {
        assert_eq!(select_files(yaml("no"), "test").unwrap(), Value::Bool(false));
        assert_eq!(select_files(yaml("[]"), "test").unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_select_files_mapping_splits_attrs() {
        let coerced = select_files(yaml("root: src\nselect: '*.py'"), "test").unwrap();
        let Value::Mapping(map) = coerced else {
            panic!("expected mapping");
        };
        assert_eq!(get(&map, "root"), &yaml("src"));
        assert_eq!(
            get(&map, "select"),
            &yaml("[{exclude: '*'}, {include: '*.py'}]")
        );
    }

    #[test]
    fn test_string_or_list() {
        assert_eq!(string_or_list(Value::Null, "test", "x").unwrap(), Vec::<String>::new());
        assert_eq!(string_or_list(yaml("a"), "test", "x").unwrap(), vec!["a"]);
        assert_eq!(string_or_list(yaml("[a, b]"), "test", "x").unwrap(), vec!["a", "b"]);
        assert!(string_or_list(yaml("{a: 1}"), "test", "x").is_err());
    }
}
