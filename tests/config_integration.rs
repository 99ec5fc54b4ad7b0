use std::path::PathBuf;

use mdpress::config::{
    ConfigFlags, LayoutMode, ThemeMode, clear_config_flags, load_config_flags, parse_flag_tokens,
    save_config_flags,
};

#[test]
fn test_config_file_parsing_ignores_comments_and_blank_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".mdpressrc");
    let content = r"
# comment
--watch

--theme light

--layout=single
--render-debug-log=export.log
";
    std::fs::write(&path, content).unwrap();

    let flags = load_config_flags(&path).unwrap();
    assert!(flags.watch);
    assert_eq!(flags.theme, Some(ThemeMode::Light));
    assert_eq!(flags.layout, Some(LayoutMode::Single));
    assert_eq!(flags.render_debug_log, Some(PathBuf::from("export.log")));
}

#[test]
fn test_cli_flags_override_file_flags() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".mdpressrc");
    let content = "--watch\n--layout single\n--output saved.pdf\n";
    std::fs::write(&path, content).unwrap();

    let file_flags = load_config_flags(&path).unwrap();
    let cli_args = vec![
        "mdpress".to_string(),
        "notes.md".to_string(),
        "--layout".to_string(),
        "paged".to_string(),
        "--perf".to_string(),
    ];
    let cli_flags = parse_flag_tokens(&cli_args);

    let effective = file_flags.union(&cli_flags);
    assert!(effective.watch, "file flags should remain enabled");
    assert!(effective.perf, "cli flags should be applied");
    assert_eq!(effective.layout, Some(LayoutMode::Paged), "cli should override layout");
    assert_eq!(
        effective.output,
        Some(PathBuf::from("saved.pdf")),
        "file config should be preserved when CLI does not override"
    );
}

#[test]
fn test_parse_flag_tokens_handles_short_and_equals_syntax() {
    let args = vec![
        "mdpress".to_string(),
        "-o".to_string(),
        "out.pdf".to_string(),
        "-w".to_string(),
        "--theme=dark".to_string(),
        "--render-debug-log=export.log".to_string(),
    ];
    let flags = parse_flag_tokens(&args);
    assert!(flags.watch);
    assert_eq!(flags.output, Some(PathBuf::from("out.pdf")));
    assert_eq!(flags.theme, Some(ThemeMode::Dark));
    assert_eq!(flags.render_debug_log, Some(PathBuf::from("export.log")));
}

#[test]
fn test_unknown_values_are_ignored() {
    let args = vec!["--layout".to_string(), "spread".to_string()];
    assert_eq!(parse_flag_tokens(&args).layout, None);
}

#[test]
fn test_saved_flags_load_back_and_clear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config");
    let flags = ConfigFlags {
        watch: true,
        theme: Some(ThemeMode::Light),
        layout: Some(LayoutMode::Single),
        output: Some(PathBuf::from("doc.pdf")),
        ..ConfigFlags::default()
    };
    save_config_flags(&path, &flags).unwrap();
    assert_eq!(load_config_flags(&path).unwrap(), flags);

    clear_config_flags(&path).unwrap();
    assert!(!path.exists());
    assert_eq!(load_config_flags(&path).unwrap(), ConfigFlags::default());
}
