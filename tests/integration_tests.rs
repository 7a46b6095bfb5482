// File backends end to end: save, inspect the text, load back.

mod common;

use common::*;
use confgraph::{
    Backend, BackendConfig, CommentMap, Context, ConverterSet, FieldSeparator, FormatKind, Node,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn file_in(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn round_trip(path: &Path) -> (String, Comprehensive) {
    let cx = context();
    let value = comprehensive();

    let mut backend = Backend::new(&cx, BackendConfig::builder(path).build());
    backend.save(&value).unwrap();
    let text = fs::read_to_string(path).unwrap();

    let mut reader = Backend::new(&cx, BackendConfig::builder(path).build());
    let loaded = reader.load::<Comprehensive>().unwrap();
    (text, loaded)
}

mod formats {
    use super::*;

    #[test]
    fn test_yaml_round_trip() {
        let dir = TempDir::new().unwrap();
        let (text, loaded) = round_trip(&file_in(&dir, "all.yml"));
        assert_eq!(loaded, comprehensive());
        assert!(text.starts_with("\"=$$=\": Comprehensive\n"));
        assert!(text.contains("# Renamed on disk\ncbool: true\n"));
    }

    #[test]
    fn test_hocon_round_trip() {
        let dir = TempDir::new().unwrap();
        let (text, loaded) = round_trip(&file_in(&dir, "all.conf"));
        assert_eq!(loaded, comprehensive());
        assert!(text.contains("cbool = true\n"));
        assert!(text.contains("mode = Creative\n"));
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let (text, loaded) = round_trip(&file_in(&dir, "all.json"));
        assert_eq!(loaded, comprehensive());
        assert!(text.contains("  \"cbool\": true"));
        assert!(!text.contains('#'));
    }

    #[test]
    fn test_control_characters_survive_every_format() {
        let dir = TempDir::new().unwrap();
        let cx = context();
        let server = Server {
            name: "bell\u{7} tab\t cr\r end".to_string(),
            ..Server::default()
        };

        for name in ["ctrl.yml", "ctrl.conf", "ctrl.json"] {
            let path = file_in(&dir, name);
            Backend::new(&cx, BackendConfig::builder(&path).build())
                .save(&server)
                .unwrap();
            let text = fs::read_to_string(&path).unwrap();
            assert!(!text.contains('\u{7}'), "{name} holds a raw control character");

            let loaded = Backend::new(&cx, BackendConfig::builder(&path).build())
                .load::<Server>()
                .unwrap();
            assert_eq!(loaded, server, "{name}");
        }
    }

    #[test]
    fn test_hash_map_output_does_not_depend_on_insertion_order() {
        let dir = TempDir::new().unwrap();
        let cx = context();
        let keys: Vec<String> = (0..30).map(|i| format!("k{i:02}")).collect();
        let mut forward = comprehensive();
        let mut backward = comprehensive();
        forward.lookup = keys
            .iter()
            .map(|key| (key.clone(), Child { a_boolean: key.ends_with('3') }))
            .collect();
        backward.lookup = keys
            .iter()
            .rev()
            .map(|key| (key.clone(), Child { a_boolean: key.ends_with('3') }))
            .collect();

        for ext in ["yml", "conf", "json"] {
            let first = file_in(&dir, &format!("forward.{ext}"));
            let second = file_in(&dir, &format!("backward.{ext}"));
            Backend::new(&cx, BackendConfig::builder(&first).build())
                .save(&forward)
                .unwrap();
            Backend::new(&cx, BackendConfig::builder(&second).build())
                .save(&backward)
                .unwrap();

            let text = fs::read_to_string(&first).unwrap();
            assert_eq!(text, fs::read_to_string(&second).unwrap(), "{ext}");
            let (Some(low), Some(high)) = (text.find("k00"), text.find("k29")) else {
                panic!("lookup keys missing from {ext} output");
            };
            assert!(low < high);
        }
    }

    #[test]
    fn test_hand_written_enum_like_in_every_format() {
        let dir = TempDir::new().unwrap();
        let cx = context();
        let alarm = Alarm {
            level: Level::HIGH,
            escalation: vec![Level::LOW, Level::NORMAL, Level::HIGH],
            fallback: Some(Level::LOW),
        };

        for name in ["alarm.yml", "alarm.conf", "alarm.json"] {
            let path = file_in(&dir, name);
            let mut backend = Backend::new(&cx, BackendConfig::builder(&path).build());
            backend.save(&alarm).unwrap();
            let text = fs::read_to_string(&path).unwrap();
            assert!(text.contains("High"), "{name}");
            assert!(!text.contains('9'), "{name} stored the rank");
            assert_eq!(backend.load::<Alarm>().unwrap(), alarm, "{name}");
        }

        let path = file_in(&dir, "typed.yml");
        fs::write(&path, "\"=$$=\": Alarm\nlevel: low\nescalation: [HIGH]\nfallback: null\n").unwrap();
        let loaded = Backend::new(&cx, BackendConfig::builder(&path).build())
            .load::<Alarm>()
            .unwrap();
        assert_eq!(loaded.level.rank(), 1);
        assert_eq!(loaded.escalation, vec![Level::HIGH]);
        assert_eq!(loaded.fallback, None);
    }

    #[test]
    fn test_explicit_format_beats_extension() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "settings.txt");
        let cx = context();
        let config = BackendConfig::builder(&path).format(FormatKind::Hocon).build();
        Backend::new(&cx, config.clone()).save(&Server::default()).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("port = 25565"));
        assert_eq!(
            Backend::new(&cx, config).load::<Server>().unwrap(),
            Server::default()
        );
    }
}

mod comments {
    use super::*;

    #[test]
    fn test_schema_comments_are_written() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "server.yml");
        let cx = context();
        Backend::new(&cx, BackendConfig::builder(&path).build())
            .save(&Server::default())
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains(
            "# Address to bind\nhost: localhost\n# Port to listen on\n# Must be between 1 and 65535\nport: 25565\n"
        ));
    }

    #[test]
    fn test_nested_comments_are_indented() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "proxy.conf");
        let cx = context();
        let proxy = Proxy {
            fallback: Some(Server::default()),
            ..Proxy::default()
        };
        Backend::new(&cx, BackendConfig::builder(&path).indent(4).build())
            .save(&proxy)
            .unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("# Backend servers\nservers = []\n"));
        assert!(text.contains("fallback {\n"));
        assert!(text.contains("    # Address to bind\n    host = localhost\n"));
    }

    #[test]
    fn test_user_comments_survive_reload() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "server.yml");
        let cx = context();

        let mut backend = Backend::new(&cx, BackendConfig::builder(&path).build());
        backend
            .comments_mut()
            .set_comments_for_path("mode", ["Survival or Creative", "", "see the manual"]);
        backend.comments_mut().set_comments_for_path("host", ["Custom host note"]);
        backend.save(&Server::default()).unwrap();

        let mut reader = Backend::new(&cx, BackendConfig::builder(&path).build());
        reader.load::<Server>().unwrap();
        let comments = reader.comments();
        assert_eq!(
            comments.raw("mode").unwrap(),
            &["Survival or Creative", "", "see the manual"]
        );
        // Caller-set blocks win over schema comments.
        assert_eq!(comments.raw("host").unwrap(), &["Custom host note"]);
        assert_eq!(
            comments.raw("port").unwrap(),
            &["Port to listen on", "Must be between 1 and 65535"]
        );

        // Saving again from the reader keeps the file identical.
        let before = fs::read_to_string(&path).unwrap();
        reader.save(&Server::default()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }

    #[test]
    fn test_header_is_kept_out_of_field_comments() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "server.conf");
        let cx = context();
        let config = BackendConfig::builder(&path)
            .header(["Server configuration", "Edit with care"])
            .build();

        Backend::new(&cx, config.clone()).save(&Server::default()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# Server configuration\n# Edit with care\n\n"));

        let mut reader = Backend::new(&cx, config);
        reader.load::<Server>().unwrap();
        assert!(!reader.comments().contains(confgraph::TYPE_TAG_KEY));

        let before = text;
        reader.save(&Server::default()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), before);
    }
}

mod options {
    use super::*;

    #[test]
    fn test_colon_separator_and_crlf() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "server.conf");
        let cx = context();
        let config = BackendConfig::builder(&path)
            .field_separator(FieldSeparator::Colon)
            .line_separator("\r\n")
            .build();

        Backend::new(&cx, config.clone()).save(&Server::default()).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("port: 25565\r\n"));
        assert!(!text.replace("\r\n", "").contains('\n'));

        assert_eq!(
            Backend::new(&cx, config).load::<Server>().unwrap(),
            Server::default()
        );
    }

    #[test]
    fn test_backend_converter_override() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "parent.yml");
        let cx = context();
        let layered = ConverterSet::layer(cx.converters())
            .exact::<Child>(ChildAsFlag)
            .build();
        let config = BackendConfig::builder(&path).converters(layered).build();
        let parent = Parent {
            a_child: Child { a_boolean: true },
        };

        let mut backend = Backend::new(&cx, config);
        backend.save(&parent).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "\"=$$=\": Parent\naChild: true\n"
        );
        assert_eq!(backend.load::<Parent>().unwrap(), parent);
    }

    #[test]
    fn test_backend_converters_replace_context_set() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "parent.yml");
        let flagged = ConverterSet::layer(&ConverterSet::defaults())
            .exact::<Child>(ChildAsFlag)
            .build();
        let cx = Context::builder()
            .converters(flagged)
            .register::<Child>()
            .and_then(|b| b.register::<Parent>())
            .and_then(|b| b.build())
            .unwrap();
        let parent = Parent {
            a_child: Child { a_boolean: true },
        };

        Backend::new(&cx, BackendConfig::builder(&path).build())
            .save(&parent)
            .unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("aChild: true\n"));

        let plain = BackendConfig::builder(&path)
            .converters(ConverterSet::defaults())
            .build();
        Backend::new(&cx, plain).save(&parent).unwrap();
        assert!(fs::read_to_string(&path)
            .unwrap()
            .contains("aChild:\n  \"=$$=\": Child\n  aBoolean: true\n"));
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_load_or_default_creates_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("dir").join("server.yml");
        let cx = context();

        let mut backend = Backend::new(&cx, BackendConfig::builder(&path).build());
        let value = backend.load_or_default::<Server>().unwrap();
        assert_eq!(value, Server::default());
        assert!(path.exists());

        fs::write(&path, "port: 8080\nname: main\n").unwrap();
        let value = backend.load_or_default::<Server>().unwrap();
        assert_eq!(value.port, 8080);
        assert_eq!(value.name, "main");
        assert_eq!(value.host, "localhost");
    }

    #[test]
    fn test_save_replaces_whole_file() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "server.yml");
        fs::write(&path, "x".repeat(4096)).unwrap();

        let cx = context();
        Backend::new(&cx, BackendConfig::builder(&path).build())
            .save(&Server::default())
            .unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(!text.contains("xxxx"));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_polymorphic_file() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "any.yml");
        let cx = context();
        let server = Server {
            extra: Some(confgraph::Dynamic::new(Child { a_boolean: true })),
            ..Server::default()
        };

        let mut backend = Backend::new(&cx, BackendConfig::builder(&path).build());
        backend.save_dyn(&server).unwrap();
        let loaded = backend.load_untyped().unwrap();
        assert_eq!(loaded.downcast_ref::<Server>(), Some(&server));
    }

    #[test]
    fn test_failed_load_keeps_previous_comments() {
        let dir = TempDir::new().unwrap();
        let path = file_in(&dir, "server.yml");
        let cx = context();
        let mut backend = Backend::new(&cx, BackendConfig::builder(&path).build());
        backend.comments_mut().set_comments_for_path("port", ["kept"]);

        fs::write(&path, "port: [1, 2\n").unwrap();
        assert!(backend.load::<Server>().is_err());
        assert_eq!(backend.comments().raw("port").unwrap(), &["kept"]);
    }
}

#[test]
fn test_text_parsers_agree() {
    let yaml = "\"=$$=\": Child\naBoolean: true\n";
    let hocon = "\"=$$=\" = Child\naBoolean = true\n";
    let json = "{\"=$$=\": \"Child\", \"aBoolean\": true}";

    let parse = |kind: FormatKind, text: &str| -> Node {
        kind.handler()
            .parse(text, "inline", &mut CommentMap::default())
            .unwrap()
    };
    let expected = parse(FormatKind::Json, json);
    assert_eq!(parse(FormatKind::Yaml, yaml), expected);
    assert_eq!(parse(FormatKind::Hocon, hocon), expected);
}
