//! End-to-end pipeline tests
//!
//! Archives are synthesized in-test, shrunk through the public pipeline and
//! read back with the archive index.

#[path = "../../src/test_support.rs"]
mod test_support;

use jarprune::analysis::KeepRules;
use jarprune::{ArchiveIndex, MalformedClassPolicy, Pipeline, ShrinkError, ShrinkOptions, Stage};
use std::fs;
use std::path::{Path, PathBuf};
use test_support::{ClassFileBuilder, ZipBuilder};

fn write(dir: &Path, name: &str, bytes: Vec<u8>) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

fn member_paths(path: &Path) -> Vec<String> {
    ArchiveIndex::open(path)
        .unwrap()
        .members()
        .iter()
        .map(|m| m.path.clone())
        .collect()
}

/// A small application: Main -> Service -> Helper, plus dead code and resources
fn application() -> ZipBuilder {
    let main = ClassFileBuilder::new("app/Main")
        .method("main", "([Ljava/lang/String;)V")
        .calls("app/Service", "run", "()V")
        .string("/config/app.properties")
        .build();
    let service = ClassFileBuilder::new("app/Service")
        .field("helper", "Lapp/util/Helper;")
        .build();
    let helper = ClassFileBuilder::new("app/util/Helper").build();
    let unused = ClassFileBuilder::new("app/legacy/OldReport")
        .uses_class("app/util/Helper")
        .string("templates/report.html")
        .build();

    ZipBuilder::new()
        .directory("META-INF/")
        .stored("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\r\nMain-Class: app.Main\r\n\r\n")
        .directory("app/")
        .stored("app/Main.class", &main)
        .deflated("app/Service.class", &service)
        .directory("app/util/")
        .stored("app/util/Helper.class", &helper)
        .directory("app/legacy/")
        .stored("app/legacy/OldReport.class", &unused)
        .directory("config/")
        .deflated("config/app.properties", b"greeting=hello\n")
        .directory("templates/")
        .stored("templates/report.html", b"<html></html>")
}

#[test]
fn test_shrinks_to_reachable_closure() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());
    let output = dir.path().join("app.min.jar");

    let report = Pipeline::default()
        .run(&input, &output, &KeepRules::default())
        .unwrap();

    assert_eq!(
        member_paths(&output),
        vec![
            "META-INF/",
            "META-INF/MANIFEST.MF",
            "app/",
            "app/Main.class",
            "app/Service.class",
            "app/util/",
            "app/util/Helper.class",
            "config/",
            "config/app.properties",
        ]
    );
    assert_eq!(report.entry_points, vec!["app/Main"]);
    assert_eq!(report.members_before, 13);
    assert_eq!(report.members_after, 9);

    let pruned: Vec<&str> = report.pruned.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(
        pruned,
        vec!["app/legacy/", "app/legacy/OldReport.class", "templates/", "templates/report.html"]
    );
    assert!(report.stored_bytes_after < report.stored_bytes_before);
    assert_eq!(report.output.as_deref(), Some(output.as_path()));
}

#[test]
fn test_retained_members_are_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());
    let output = dir.path().join("out.jar");

    Pipeline::default()
        .run(&input, &output, &KeepRules::new("app.Main"))
        .unwrap();

    let before = ArchiveIndex::open(&input).unwrap();
    let after = ArchiveIndex::open(&output).unwrap();
    for member in after.members() {
        let original = before.get(&member.path).unwrap();
        assert_eq!(member.raw(), original.raw(), "{}", member.path);
        assert_eq!(member.crc32, original.crc32);
        assert_eq!(member.data().unwrap(), original.data().unwrap());
    }
}

#[test]
fn test_second_pass_prunes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());
    let once = dir.path().join("once.jar");
    let twice = dir.path().join("twice.jar");

    let first = Pipeline::default().run(&input, &once, &KeepRules::default()).unwrap();
    let second = Pipeline::default().run(&once, &twice, &KeepRules::default()).unwrap();

    assert!(!first.pruned.is_empty());
    assert!(second.pruned.is_empty());
    assert_eq!(member_paths(&once), member_paths(&twice));
}

#[test]
fn test_output_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());
    let first = dir.path().join("first.jar");
    let second = dir.path().join("second.jar");
    let rules = KeepRules::new("app.Main");

    Pipeline::default().run(&input, &first, &rules).unwrap();
    Pipeline::default().run(&input, &second, &rules).unwrap();

    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
}

#[test]
fn test_explicit_entry_point_is_used_alongside_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());

    let report = Pipeline::default()
        .analyze(&input, &KeepRules::new("app/legacy/OldReport.class"))
        .unwrap();

    assert_eq!(report.entry_points, vec!["app/legacy/OldReport"]);
    // The manifest is always kept and its Main-Class stays reachable through it
    assert!(report.pruned.is_empty());
}

#[test]
fn test_keep_patterns_force_retention() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());

    let rules = KeepRules::new("app.Main")
        .with_keep_pattern("app.legacy.*")
        .with_keep_pattern("com.missing.**");
    let report = Pipeline::default().analyze(&input, &rules).unwrap();

    let pruned: Vec<&str> = report.pruned.iter().map(|m| m.path.as_str()).collect();
    assert!(!pruned.contains(&"app/legacy/OldReport.class"));
    // Referenced from the forced class
    assert!(!pruned.contains(&"templates/report.html"));
    assert_eq!(report.unmatched_patterns, vec!["com.missing.**"]);
    assert!(report.warnings.iter().any(|w| w.contains("com.missing.**")));
}

#[test]
fn test_resource_keep_pattern() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());

    let rules = KeepRules::new("app.Main").with_resource_pattern("templates/**");
    let report = Pipeline::default().analyze(&input, &rules).unwrap();

    let pruned: Vec<&str> = report.pruned.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(pruned, vec!["app/legacy/", "app/legacy/OldReport.class"]);
}

#[test]
fn test_markers_survive_missing_intermediate_markers() {
    let dir = tempfile::tempdir().unwrap();
    let main = ClassFileBuilder::new("app/Main")
        .string("/assets/img/logo.png")
        .build();

    // No app/ or assets/img/ markers, as Gradle writes with directory entries off
    let bytes = ZipBuilder::new()
        .stored("app/Main.class", &main)
        .directory("assets/")
        .stored("assets/img/logo.png", b"\x89PNG")
        .directory("unused/")
        .stored("unused/deep/notes.txt", b"stale")
        .build();
    let input = write(dir.path(), "app.jar", bytes);

    let report = Pipeline::default()
        .analyze(&input, &KeepRules::new("app.Main"))
        .unwrap();

    let pruned: Vec<&str> = report.pruned.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(pruned, vec!["unused/", "unused/deep/notes.txt"]);
}

#[test]
fn test_service_registrations() {
    let dir = tempfile::tempdir().unwrap();
    let main = ClassFileBuilder::new("app/Main").uses_class("app/spi/Codec").build();
    let codec = ClassFileBuilder::new("app/spi/Codec").build();
    let json = ClassFileBuilder::new("app/spi/JsonCodec").implements("app/spi/Codec").build();
    let driver = ClassFileBuilder::new("app/db/Driver").build();
    let orphan_api = ClassFileBuilder::new("app/spi/Orphan").build();
    let orphan_impl = ClassFileBuilder::new("app/spi/OrphanImpl").build();

    let bytes = ZipBuilder::new()
        .stored("app/Main.class", &main)
        .stored("app/spi/Codec.class", &codec)
        .stored("app/spi/JsonCodec.class", &json)
        .stored("app/db/Driver.class", &driver)
        .stored("app/spi/Orphan.class", &orphan_api)
        .stored("app/spi/OrphanImpl.class", &orphan_impl)
        .stored("META-INF/services/app.spi.Codec", b"# codecs\napp.spi.JsonCodec\n")
        .stored("META-INF/services/java.sql.Driver", b"app.db.Driver\n")
        .stored("META-INF/services/app.spi.Orphan", b"app.spi.OrphanImpl\n")
        .build();
    let input = write(dir.path(), "svc.jar", bytes);

    let report = Pipeline::default()
        .analyze(&input, &KeepRules::new("app.Main"))
        .unwrap();
    let pruned: Vec<&str> = report.pruned.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(
        pruned,
        vec![
            "app/spi/Orphan.class",
            "app/spi/OrphanImpl.class",
            "META-INF/services/app.spi.Orphan"
        ]
    );

    let options = ShrinkOptions {
        keep_external_services: false,
        ..Default::default()
    };
    let report = Pipeline::new(options)
        .analyze(&input, &KeepRules::new("app.Main"))
        .unwrap();
    let pruned: Vec<&str> = report.pruned.iter().map(|m| m.path.as_str()).collect();
    assert!(pruned.contains(&"META-INF/services/java.sql.Driver"));
    assert!(pruned.contains(&"app/db/Driver.class"));
}

#[test]
fn test_class_name_literals() {
    let dir = tempfile::tempdir().unwrap();
    let main = ClassFileBuilder::new("app/Main").string("app.plugins.Loaded").build();
    let loaded = ClassFileBuilder::new("app/plugins/Loaded").build();
    let input = write(
        dir.path(),
        "lit.jar",
        ZipBuilder::new()
            .stored("app/Main.class", &main)
            .stored("app/plugins/Loaded.class", &loaded)
            .build(),
    );

    let report = Pipeline::default()
        .analyze(&input, &KeepRules::new("app.Main"))
        .unwrap();
    assert!(report.pruned.is_empty());

    let options = ShrinkOptions {
        class_name_literals: false,
        ..Default::default()
    };
    let report = Pipeline::new(options)
        .analyze(&input, &KeepRules::new("app.Main"))
        .unwrap();
    assert_eq!(report.pruned.len(), 1);
    assert_eq!(report.pruned[0].path, "app/plugins/Loaded.class");
}

#[test]
fn test_missing_and_unknown_entry_points() {
    let dir = tempfile::tempdir().unwrap();
    let main = ClassFileBuilder::new("app/Main").build();
    let input = write(
        dir.path(),
        "nomain.jar",
        ZipBuilder::new().stored("app/Main.class", &main).build(),
    );
    let output = dir.path().join("out.jar");

    let err = Pipeline::default()
        .run(&input, &output, &KeepRules::default())
        .unwrap_err();
    assert!(matches!(err, ShrinkError::MissingEntryPoint));
    assert_eq!(err.exit_code(), 4);

    let err = Pipeline::default()
        .run(&input, &output, &KeepRules::new("app.Nope"))
        .unwrap_err();
    assert!(matches!(err, ShrinkError::UnknownEntryPoint { ref entry_point } if entry_point == "app.Nope"));
    assert!(!output.exists());
}

#[test]
fn test_pattern_without_wildcards_is_exact() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());

    let rules = KeepRules::new("app.Main")
        .with_resource_pattern("[")
        .with_resource_pattern("/templates/report.html");
    let report = Pipeline::default().analyze(&input, &rules).unwrap();

    assert_eq!(report.unmatched_patterns, vec!["["]);
    let pruned: Vec<&str> = report.pruned.iter().map(|m| m.path.as_str()).collect();
    assert_eq!(pruned, vec!["app/legacy/", "app/legacy/OldReport.class"]);
}

#[test]
fn test_malformed_class_policy() {
    let dir = tempfile::tempdir().unwrap();
    let main = ClassFileBuilder::new("app/Main").build();
    let broken = ClassFileBuilder::new("app/Broken").magic(0xDEAD_BEEF).build();
    let input = write(
        dir.path(),
        "broken.jar",
        ZipBuilder::new()
            .stored("app/Main.class", &main)
            .stored("app/Broken.class", &broken)
            .build(),
    );
    let output = dir.path().join("out.jar");

    let err = Pipeline::default()
        .run(&input, &output, &KeepRules::new("app.Main"))
        .unwrap_err();
    assert!(matches!(err, ShrinkError::MalformedClass { ref member, .. } if member == "app/Broken.class"));
    assert_eq!(err.exit_code(), 3);
    assert!(!output.exists());

    let options = ShrinkOptions {
        malformed_classes: MalformedClassPolicy::TreatAsResource,
        ..Default::default()
    };
    let report = Pipeline::new(options)
        .run(&input, &output, &KeepRules::new("app.Main"))
        .unwrap();
    assert_eq!(member_paths(&output), vec!["app/Main.class"]);
    assert!(report.warnings.iter().any(|w| w.contains("app/Broken.class")));
}

#[test]
fn test_corrupt_archive() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "junk.jar", b"definitely not a zip archive".to_vec());

    let err = Pipeline::default()
        .analyze(&input, &KeepRules::new("app.Main"))
        .unwrap_err();
    assert!(matches!(err, ShrinkError::ArchiveCorrupt { .. }));
    assert_eq!(err.exit_code(), 2);

    let err = Pipeline::default()
        .analyze(&dir.path().join("missing.jar"), &KeepRules::new("app.Main"))
        .unwrap_err();
    assert!(matches!(err, ShrinkError::ArchiveUnreadable { .. }));
}

#[test]
fn test_pruned_cycles_and_duplicates_are_reported() {
    let dir = tempfile::tempdir().unwrap();
    let main = ClassFileBuilder::new("app/Main")
        .string("icons/a.png")
        .string("icons/b.png")
        .build();
    let ping = ClassFileBuilder::new("app/dead/Ping").uses_class("app/dead/Pong").build();
    let pong = ClassFileBuilder::new("app/dead/Pong").uses_class("app/dead/Ping").build();
    let input = write(
        dir.path(),
        "cyc.jar",
        ZipBuilder::new()
            .stored("app/Main.class", &main)
            .stored("app/dead/Ping.class", &ping)
            .stored("app/dead/Pong.class", &pong)
            .stored("icons/a.png", b"same pixels")
            .deflated("icons/b.png", b"same pixels")
            .build(),
    );

    let options = ShrinkOptions {
        find_duplicates: true,
        ..Default::default()
    };
    let report = Pipeline::new(options)
        .analyze(&input, &KeepRules::new("app.Main"))
        .unwrap();

    assert_eq!(report.pruned_cycles.len(), 1);
    assert_eq!(report.pruned_cycles[0].members, vec!["app/dead/Ping.class", "app/dead/Pong.class"]);
    assert_eq!(report.duplicates.len(), 1);
    assert_eq!(report.duplicates[0].paths, vec!["icons/a.png", "icons/b.png"]);
}

#[test]
fn test_recompression_shrinks_stored_members() {
    let dir = tempfile::tempdir().unwrap();
    let main = ClassFileBuilder::new("app/Main").string("data/big.txt").build();
    let big = "all work and no play ".repeat(200);
    let input = write(
        dir.path(),
        "big.jar",
        ZipBuilder::new()
            .stored("app/Main.class", &main)
            .stored("data/big.txt", big.as_bytes())
            .build(),
    );
    let output = dir.path().join("out.jar");

    let options = ShrinkOptions {
        recompress: true,
        ..Default::default()
    };
    let report = Pipeline::new(options)
        .run(&input, &output, &KeepRules::new("app.Main"))
        .unwrap();
    assert!(report.recompressed >= 1);

    let index = ArchiveIndex::open(&output).unwrap();
    let member = index.get("data/big.txt").unwrap();
    assert!(member.stored_size() < big.len() as u64);
    assert_eq!(member.data().unwrap().as_ref(), big.as_bytes());
}

#[test]
fn test_cancellation_leaves_no_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = write(dir.path(), "app.jar", application().build());
    let output = dir.path().join("out.jar");

    let pipeline = Pipeline::default();
    let token = pipeline.cancellation_token();
    let pipeline = pipeline.on_stage(move |stage| {
        if stage == Stage::Resolving {
            token.cancel();
        }
    });

    let err = pipeline
        .run(&input, &output, &KeepRules::new("app.Main"))
        .unwrap_err();
    assert!(matches!(err, ShrinkError::Cancelled { stage: Stage::Writing }));
    assert_eq!(err.exit_code(), 130);
    assert!(!output.exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
