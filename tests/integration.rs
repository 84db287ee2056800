use anyhow::Result;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

use dirlock::config::{self, Anchors, JsonConfigSource, RunOptions, Section};
use dirlock::key_manager::{KeyMaterial, KeyPersistence, KeySink};
use dirlock::pipeline::{Direction, TransformPipeline};
use dirlock::protect::ProtectedPaths;
use dirlock::walker::{DirectoryWalker, SkipReason, TraversalOutcome};
use dirlock::DirlockError;

fn fixed_key() -> KeyMaterial {
    KeyMaterial::from_bytes([0x42u8; 32])
}

async fn run(root: &Path, direction: Direction, compress: bool, protected: ProtectedPaths) -> Result<()> {
    let pipeline = TransformPipeline::from_key(direction, &fixed_key()).with_compression(compress);
    let report = DirectoryWalker::new(pipeline, protected).walk(root).await?;
    assert_eq!(report.failed(), 0, "unexpected failures: {:?}", report.failures().collect::<Vec<_>>());
    Ok(())
}

/// `/data` with `a.txt`, `sub/b.bin` and a protected `cfg.ini`
fn data_tree() -> Result<(TempDir, ProtectedPaths)> {
    let tmp = TempDir::new()?;
    let data = tmp.path();
    fs::create_dir(data.join("sub"))?;
    fs::write(data.join("a.txt"), b"hello")?;
    fs::write(data.join("sub").join("b.bin"), [0x00u8, 0x01])?;
    fs::write(data.join("cfg.ini"), b"[DEFAULT]\nsite = vault\n")?;

    let mut protected = ProtectedPaths::new();
    protected.insert(&data.join("cfg.ini"))?;
    Ok((tmp, protected))
}

#[tokio::test]
async fn data_scenario_without_compression() -> Result<()> {
    let (tmp, protected) = data_tree()?;
    let data = tmp.path();
    let cfg_before = fs::read(data.join("cfg.ini"))?;

    run(data, Direction::Encrypt, false, protected.clone()).await?;
    assert_ne!(fs::read(data.join("a.txt"))?, b"hello");
    assert_ne!(fs::read(data.join("sub/b.bin"))?, [0x00u8, 0x01]);
    assert_eq!(fs::read(data.join("cfg.ini"))?, cfg_before);

    run(data, Direction::Decrypt, false, protected).await?;
    assert_eq!(fs::read(data.join("a.txt"))?, b"hello");
    assert_eq!(fs::read(data.join("sub/b.bin"))?, [0x00u8, 0x01]);
    assert_eq!(fs::read(data.join("cfg.ini"))?, cfg_before);
    Ok(())
}

#[tokio::test]
async fn round_trip_with_compression() -> Result<()> {
    let (tmp, protected) = data_tree()?;
    let data = tmp.path();
    let big = b"compressible line\n".repeat(500);
    fs::write(data.join("sub").join("big.txt"), &big)?;

    run(data, Direction::Encrypt, true, protected.clone()).await?;
    run(data, Direction::Decrypt, true, protected).await?;

    assert_eq!(fs::read(data.join("a.txt"))?, b"hello");
    assert_eq!(fs::read(data.join("sub/b.bin"))?, [0x00u8, 0x01]);
    assert_eq!(fs::read(data.join("sub/big.txt"))?, big);
    Ok(())
}

#[tokio::test]
async fn protected_file_survives_repeated_walks() -> Result<()> {
    let (tmp, protected) = data_tree()?;
    let data = tmp.path();
    let cfg_before = fs::read(data.join("cfg.ini"))?;

    for direction in [Direction::Encrypt, Direction::Encrypt, Direction::Decrypt, Direction::Decrypt] {
        let pipeline = TransformPipeline::from_key(direction, &fixed_key());
        let report = DirectoryWalker::new(pipeline, protected.clone()).walk(data).await?;
        assert!(matches!(
            report.outcome_for(&data.join("cfg.ini")),
            Some(TraversalOutcome::Skipped(SkipReason::Protected))
        ));
        assert_eq!(fs::read(data.join("cfg.ini"))?, cfg_before);
    }

    // double encryption is undone by double decryption
    assert_eq!(fs::read(data.join("a.txt"))?, b"hello");
    Ok(())
}

#[tokio::test]
async fn wrong_key_fails_per_file_only() -> Result<()> {
    let (tmp, protected) = data_tree()?;
    let data = tmp.path();
    run(data, Direction::Encrypt, false, protected.clone()).await?;

    // one extra file sealed under a different key
    let stranger = data.join("stranger.txt");
    let other = TransformPipeline::from_key(Direction::Encrypt, &KeyMaterial::generate());
    fs::write(&stranger, other.apply(b"other key")?)?;
    let stranger_bytes = fs::read(&stranger)?;

    let pipeline = TransformPipeline::from_key(Direction::Decrypt, &fixed_key());
    let report = DirectoryWalker::new(pipeline, protected).walk(data).await?;

    assert_eq!(report.failed(), 1);
    assert!(matches!(
        report.outcome_for(&stranger),
        Some(TraversalOutcome::Failed(DirlockError::Integrity(_)))
    ));
    assert_eq!(fs::read(&stranger)?, stranger_bytes);
    assert_eq!(fs::read(data.join("a.txt"))?, b"hello");
    assert_eq!(fs::read(data.join("sub/b.bin"))?, [0x00u8, 0x01]);
    Ok(())
}

#[tokio::test]
async fn malformed_gzip_is_codec_error() -> Result<()> {
    let tmp = TempDir::new()?;
    let file = tmp.path().join("raw.txt");
    fs::write(&file, b"plain text, no gzip header")?;

    let pipeline = TransformPipeline::from_key(Direction::Decrypt, &fixed_key()).with_compression(true);
    let report = DirectoryWalker::new(pipeline, ProtectedPaths::new())
        .walk(tmp.path())
        .await?;

    assert!(matches!(
        report.outcome_for(&file),
        Some(TraversalOutcome::Failed(DirlockError::Codec(_)))
    ));
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn unreadable_file_does_not_stop_siblings() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let tmp = TempDir::new()?;
    let root = tmp.path();
    for i in 0..4 {
        fs::write(root.join(format!("f{}.txt", i)), format!("file {}", i))?;
    }
    let locked = root.join("f2.txt");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

    // permission bits do not apply to privileged users; wrong_key_fails_per_file_only
    // covers isolation for them
    if fs::read(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o644))?;
        eprintln!("skipping unreadable_file_does_not_stop_siblings: file modes are not enforced for this user");
        return Ok(());
    }

    let pipeline = TransformPipeline::from_key(Direction::Encrypt, &fixed_key());
    let report = DirectoryWalker::new(pipeline, ProtectedPaths::new()).walk(root).await?;
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644))?;

    assert_eq!(report.failed(), 1);
    assert_eq!(report.transformed(), 3);
    assert!(matches!(
        report.outcome_for(&locked),
        Some(TraversalOutcome::Failed(DirlockError::Io(_)))
    ));
    assert_eq!(fs::read(&locked)?, b"file 2");
    Ok(())
}

#[tokio::test]
async fn missing_root_is_critical() -> Result<()> {
    let tmp = TempDir::new()?;
    let pipeline = TransformPipeline::from_key(Direction::Encrypt, &fixed_key());
    let result = DirectoryWalker::new(pipeline, ProtectedPaths::new())
        .walk(&tmp.path().join("gone"))
        .await;

    let err = result.expect_err("walk of a missing root must fail");
    assert!(matches!(err, DirlockError::Critical(_)));
    assert!(err.is_fatal());
    Ok(())
}

fn anchors_in(dir: &Path) -> Anchors {
    Anchors {
        executable: dir.join("dirlock"),
        home: dir.to_path_buf(),
        config_file: dir.join("dirlock.json"),
        default_config_file: dir.join("dirlock.json"),
    }
}

#[tokio::test]
async fn generated_key_is_backed_up_and_reverses_the_run() -> Result<()> {
    let tmp = TempDir::new()?;
    let target = tmp.path().join("target");
    fs::create_dir(&target)?;
    fs::write(target.join("doc.txt"), b"precious")?;
    let backup = tmp.path().join("keys.bak");

    let mut sections: HashMap<String, Section> = HashMap::new();
    sections.insert(
        "DEFAULT".into(),
        Section::from([
            ("target".to_string(), target.display().to_string()),
            ("save".to_string(), backup.display().to_string()),
        ]),
    );
    let options = RunOptions {
        direction: Direction::Encrypt,
        compress: true,
    };
    let res = config::resolve(&sections, None, &anchors_in(tmp.path()), options)?;
    assert!(res.generated_key);
    assert!(res.config.is_standalone());

    let mut out = Vec::new();
    let persisted = KeySink::new(res.config.backup.clone())
        .persist(&res.config.key, &mut out)
        .await;
    assert_eq!(persisted, KeyPersistence::Appended(backup.clone()));

    // the key on disk is usable before any file has been touched
    assert_eq!(fs::read(target.join("doc.txt"))?, b"precious");
    let saved = fs::read_to_string(&backup)?;
    let line = saved.lines().last().unwrap_or_default();
    let restored = KeyMaterial::from_encoded(line)?;

    let pipeline = TransformPipeline::from_key(Direction::Encrypt, &res.config.key).with_compression(true);
    DirectoryWalker::new(pipeline, res.config.protected.clone())
        .walk(&res.config.target)
        .await?;
    assert_ne!(fs::read(target.join("doc.txt"))?, b"precious");

    let pipeline = TransformPipeline::from_key(Direction::Decrypt, &restored).with_compression(true);
    DirectoryWalker::new(pipeline, res.config.protected)
        .walk(&target)
        .await?;
    assert_eq!(fs::read(target.join("doc.txt"))?, b"precious");
    Ok(())
}

#[tokio::test]
async fn backup_file_inside_target_is_protected() -> Result<()> {
    let tmp = TempDir::new()?;
    let backup = tmp.path().join("keys.bak");
    fs::write(tmp.path().join("x.txt"), b"x")?;
    let json = format!(
        r#"{{"DEFAULT": {{"target": {:?}, "save": {:?}}}}}"#,
        tmp.path().display().to_string(),
        backup.display().to_string()
    );
    let source = JsonConfigSource::parse(&json)?;

    let options = RunOptions {
        direction: Direction::Encrypt,
        compress: false,
    };
    let res = config::resolve(&source, None, &anchors_in(tmp.path()), options)?;
    KeySink::new(res.config.backup.clone())
        .persist(&res.config.key, &mut Vec::new())
        .await;
    let saved = fs::read(&backup)?;

    let pipeline = TransformPipeline::from_key(options.direction, &res.config.key);
    let report = DirectoryWalker::new(pipeline, res.config.protected)
        .walk(&res.config.target)
        .await?;

    assert_eq!(fs::read(&backup)?, saved);
    assert_eq!(report.transformed(), 1);
    Ok(())
}

#[cfg(unix)]
#[tokio::test]
async fn backup_under_symlinked_directory_is_protected() -> Result<()> {
    let tmp = TempDir::new()?;
    let real = tmp.path().join("real");
    let link = tmp.path().join("link");
    fs::create_dir(&real)?;
    std::os::unix::fs::symlink(&real, &link)?;
    fs::write(real.join("x.txt"), b"x")?;
    let backup = link.join("keys.bak");

    let mut sections: HashMap<String, Section> = HashMap::new();
    sections.insert(
        "DEFAULT".into(),
        Section::from([
            ("target".to_string(), real.display().to_string()),
            ("save".to_string(), backup.display().to_string()),
        ]),
    );
    let options = RunOptions {
        direction: Direction::Encrypt,
        compress: false,
    };
    // the backup does not exist yet when the protected set is built
    let res = config::resolve(&sections, None, &anchors_in(tmp.path()), options)?;
    assert!(!backup.exists());

    let persisted = KeySink::new(res.config.backup.clone())
        .persist(&res.config.key, &mut Vec::new())
        .await;
    assert_eq!(persisted, KeyPersistence::Appended(backup.clone()));
    let saved = fs::read(real.join("keys.bak"))?;

    let pipeline = TransformPipeline::from_key(options.direction, &res.config.key);
    let report = DirectoryWalker::new(pipeline, res.config.protected)
        .walk(&real)
        .await?;

    assert!(matches!(
        report.outcome_for(&real.join("keys.bak")),
        Some(TraversalOutcome::Skipped(SkipReason::Protected))
    ));
    assert_eq!(fs::read(real.join("keys.bak"))?, saved);
    assert_eq!(report.transformed(), 1);
    Ok(())
}
