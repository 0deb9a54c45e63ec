use std::fs;
use std::path::Path;

use tabula::browser::Browser;
use tabula::config::Config;
use tabula::store::{Database, Value};
use tempfile::TempDir;

/// Build a config whose database and plugin directory both live inside a
/// private temp dir, so tests never touch the user's data directory.
fn sandboxed_config(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.database.database = dir
        .path()
        .join("records.db")
        .to_string_lossy()
        .into_owned();
    config.plugins.dir = Some(dir.path().join("plugins"));
    config
}

fn write_plugin(dir: &TempDir, name: &str, source: &str) {
    let plugins = dir.path().join("plugins");
    fs::create_dir_all(&plugins).unwrap();
    fs::write(plugins.join(name), source).unwrap();
}

mod startup_tests {
    use super::*;

    #[test]
    fn test_empty_store_and_no_plugins() {
        let dir = TempDir::new().unwrap();
        let mut browser = Browser::new(sandboxed_config(&dir)).unwrap();
        browser.bootstrap();

        assert_eq!(browser.record_count(), 0);
        // Only the host-native control is tracked
        assert_eq!(browser.tracked_widget_labels(), vec!["Reload plugins"]);
        assert!(browser.loaded_plugins().is_empty());
    }

    #[test]
    fn test_plugin_directory_is_created_on_first_discovery() {
        let dir = TempDir::new().unwrap();
        let config = sandboxed_config(&dir);
        let plugins_dir = config.plugins_dir().unwrap();
        assert!(!plugins_dir.exists());

        let mut browser = Browser::new(config).unwrap();
        browser.bootstrap();
        assert!(plugins_dir.is_dir());
    }
}

mod plugin_tests {
    use super::*;

    #[test]
    fn test_demo_plugin_contributes_one_widget() {
        let dir = TempDir::new().unwrap();
        write_plugin(
            &dir,
            "demo.lua",
            r#"
            function register_plugin(host)
                host:register_widget({ label = "Demo" })
            end
            "#,
        );

        let mut browser = Browser::new(sandboxed_config(&dir)).unwrap();
        let widgets_before = browser.tracked_widget_labels().len();
        browser.bootstrap();

        assert_eq!(browser.tracked_widget_labels().len(), widgets_before + 1);
        assert!(browser.loaded_plugins().contains(&"demo".to_string()));
    }

    #[test]
    fn test_repeat_discovery_never_duplicates() {
        let dir = TempDir::new().unwrap();
        write_plugin(
            &dir,
            "demo.lua",
            r#"
            function register_plugin(host)
                host:register_widget({ label = "Demo" })
            end
            "#,
        );

        let mut browser = Browser::new(sandboxed_config(&dir)).unwrap();
        browser.bootstrap();
        let after_first = browser.tracked_widget_labels();

        // A second pass with no new files loads nothing
        browser.bootstrap();
        assert_eq!(browser.tracked_widget_labels(), after_first);
        assert_eq!(browser.loaded_plugins(), vec!["demo".to_string()]);
    }

    #[test]
    fn test_new_plugin_picked_up_by_later_pass() {
        let dir = TempDir::new().unwrap();
        let mut browser = Browser::new(sandboxed_config(&dir)).unwrap();
        browser.bootstrap();
        assert!(browser.loaded_plugins().is_empty());

        write_plugin(
            &dir,
            "late.lua",
            r#"
            function register_plugin(host)
                host:register_widget({ label = "Late" })
            end
            "#,
        );
        browser.bootstrap();
        assert_eq!(browser.loaded_plugins(), vec!["late".to_string()]);
        assert_eq!(browser.tracked_widget_labels().len(), 2);
    }

    #[test]
    fn test_broken_plugin_is_isolated_from_others() {
        let dir = TempDir::new().unwrap();
        write_plugin(
            &dir,
            "a_raises.lua",
            r#"
            function register_plugin(host)
                error("broken on purpose")
            end
            "#,
        );
        write_plugin(
            &dir,
            "b_works.lua",
            r#"
            function register_plugin(host)
                host:register_widget({ label = "Works" })
            end
            "#,
        );

        let mut browser = Browser::new(sandboxed_config(&dir)).unwrap();
        browser.bootstrap();

        let loaded = browser.loaded_plugins();
        assert!(!loaded.contains(&"a_raises".to_string()));
        assert!(loaded.contains(&"b_works".to_string()));
        assert!(browser
            .tracked_widget_labels()
            .contains(&"Works".to_string()));
    }

    #[test]
    fn test_plugin_can_populate_and_refresh_the_store() {
        let dir = TempDir::new().unwrap();
        write_plugin(
            &dir,
            "seed.lua",
            r#"
            function register_plugin(host)
                host:execute(
                    "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
                    { "cpu", "6502", 3, "mos", "D1" }
                )
                host:execute(
                    "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
                    { "cpu", "68000", 2, "motorola", "D2" }
                )
                host:refresh()
            end
            "#,
        );

        let mut browser = Browser::new(sandboxed_config(&dir)).unwrap();
        browser.bootstrap();
        assert_eq!(browser.record_count(), 2);
    }
}

mod store_tests {
    use super::*;
    use tabula::browser::view::RecordView;

    #[test]
    fn test_insert_two_rows_then_refresh() {
        let dir = TempDir::new().unwrap();
        let config = sandboxed_config(&dir);
        let db = Database::open(
            &config.database,
            &config.store,
            Path::new(&config.database.database),
        )
        .unwrap();

        db.execute(
            "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
            &[
                Value::Text("rom".into()),
                Value::Text("27C256".into()),
                Value::Integer(10),
                Value::Text("st".into()),
                Value::Text("E1".into()),
            ],
        )
        .unwrap();
        db.execute(
            "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
            &[
                Value::Text("rom".into()),
                Value::Text("27C512".into()),
                Value::Integer(5),
                Value::Text("st".into()),
                Value::Text("E2".into()),
            ],
        )
        .unwrap();

        let mut view = RecordView::new(&config.store);
        let count = view.refresh(&db).unwrap();

        assert_eq!(count, 2);
        assert_eq!(view.rows()[0][1], Value::Text("27C256".into()));
        assert_eq!(view.rows()[1][1], Value::Text("27C512".into()));
    }

    #[test]
    fn test_failed_refresh_keeps_previous_display() {
        let dir = TempDir::new().unwrap();
        let config = sandboxed_config(&dir);
        let db = Database::open(
            &config.database,
            &config.store,
            Path::new(&config.database.database),
        )
        .unwrap();

        db.execute(
            "INSERT INTO parts (type, model, qty, brand, location) VALUES (?, ?, ?, ?, ?)",
            &[
                Value::Text("psu".into()),
                Value::Text("AT-200".into()),
                Value::Integer(1),
                Value::Text("generic".into()),
                Value::Text("F1".into()),
            ],
        )
        .unwrap();

        let mut view = RecordView::new(&config.store);
        view.refresh(&db).unwrap();
        assert_eq!(view.record_count(), 1);

        db.execute("DROP TABLE parts", &[]).unwrap();
        assert!(view.refresh(&db).is_err());
        assert_eq!(view.record_count(), 1);
    }
}
