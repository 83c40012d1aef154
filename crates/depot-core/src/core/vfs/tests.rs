use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::tempdir;
use url::Url;

use depot_domain::{ReleaseChannel, Repository, RepositoryError};

use crate::core::repo::local::{ChannelOptions, LocalRepository};

use super::*;

struct TestEnv {
    _temp: tempfile::TempDir,
    provider: Arc<ReleaseFileSystemProvider>,
    uri: Url,
}

fn test_env() -> Result<TestEnv> {
    let temp = tempdir()?;
    let repository = Arc::new(LocalRepository::open(Some(temp.path().join("store")))?);
    let source = temp.path().join("m-1.0.jar");
    fs::write(&source, b"abc")?;
    let module = repository.insert_module("m")?;
    repository.insert_release(&module, "1.0", &source, &HashSet::new())?;
    let uri = repository
        .release_uri(&module, "1.0")?
        .expect("release uri after insert");
    let provider = ReleaseFileSystemProvider::new(repository);
    Ok(TestEnv {
        _temp: temp,
        provider,
        uri,
    })
}

fn kind_of(err: &anyhow::Error) -> Option<&RepositoryError> {
    err.downcast_ref::<RepositoryError>()
}

fn filesystem(env: &TestEnv) -> Arc<ReleaseFileSystem> {
    env.provider
        .new_filesystem(&env.uri)
        .expect("filesystem for the seeded release")
}

#[test]
fn normalize_collapses_dot_and_dot_dot() -> Result<()> {
    let env = test_env()?;
    let fs = filesystem(&env);

    for (raw, expected) in [
        ("a/./b/../c", "a/c"),
        ("/a/./b/../c", "/a/c"),
        ("a/..", ""),
        ("/a/../..", "/"),
        ("../a", "../a"),
        ("a/../..", ".."),
        ("/", "/"),
        ("", ""),
    ] {
        let normalized = fs.path(raw, &[]).normalize();
        assert_eq!(normalized.as_str(), expected, "normalize({raw})");
        // Normalizing twice changes nothing.
        assert_eq!(normalized.normalize(), normalized, "idempotence({raw})");
    }
    Ok(())
}

#[test]
fn resolve_follows_override_and_identity_rules() -> Result<()> {
    let env = test_env()?;
    let fs = filesystem(&env);

    let base = fs.path("/lib", &[]);
    let absolute = fs.path("/etc/other", &[]);
    assert_eq!(base.resolve(&absolute), absolute);

    let empty = fs.path("", &[]);
    assert_eq!(base.resolve(&empty), base);
    assert_eq!(empty.resolve(&fs.path("a", &[])), fs.path("a", &[]));

    let joined = fs.path("a", &[]).resolve(&fs.path("b/c", &[]));
    assert_eq!(joined.as_str(), "a/b/c");

    let sibling = fs.path("/a/b", &[]).resolve_sibling(&fs.path("c", &[]));
    assert_eq!(sibling.as_str(), "/a/c");
    Ok(())
}

#[test]
fn relativize_inverts_resolve() -> Result<()> {
    let env = test_env()?;
    let fs = filesystem(&env);

    let base = fs.path("/lib", &[]);
    let other = fs.path("sub/file.jar", &[]);
    let resolved = base.resolve(&other);
    assert_eq!(resolved.as_str(), "/lib/sub/file.jar");
    assert_eq!(base.relativize(&resolved)?, other);

    let stepped = fs.path("/a/b", &[]).relativize(&fs.path("/a/c/d", &[]))?;
    assert_eq!(stepped.as_str(), "../c/d");

    assert_eq!(base.relativize(&base)?.as_str(), "");

    let err = base.relativize(&other).map(|_| ()).unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn prefix_and_suffix_match_whole_components_only() -> Result<()> {
    let env = test_env()?;
    let fs = filesystem(&env);

    let path = fs.path("ab/cd/ef", &[]);
    assert!(path.starts_with_str("ab"));
    assert!(path.starts_with_str("ab/cd"));
    assert!(!path.starts_with_str("a"));
    assert!(!path.starts_with_str("ab/c"));

    assert!(path.ends_with_str("ef"));
    assert!(path.ends_with_str("cd/ef"));
    assert!(!path.ends_with_str("f"));
    assert!(!path.ends_with_str("/ef"));

    let absolute = fs.path("/a/b", &[]);
    assert!(absolute.starts_with_str("/a"));
    assert!(!absolute.starts_with_str("a"));
    assert!(absolute.ends_with_str("/a/b"));
    Ok(())
}

#[test]
fn structure_accessors_follow_the_component_index() -> Result<()> {
    let env = test_env()?;
    let fs = filesystem(&env);

    let path = fs.path("/a/b/c", &[]);
    assert!(path.is_absolute());
    assert_eq!(path.name_count(), 3);
    assert_eq!(path.root().expect("root of an absolute path").as_str(), "/");
    assert_eq!(path.file_name().expect("file name").as_str(), "c");
    assert_eq!(path.parent().expect("parent").as_str(), "/a/b");
    assert_eq!(path.name(1).expect("second component").as_str(), "b");
    assert_eq!(path.subpath(1, 3).expect("subpath").as_str(), "b/c");
    let names: Vec<String> = path.iter().map(|p| p.as_str().to_string()).collect();
    assert_eq!(names, ["a", "b", "c"]);

    let single = fs.path("only", &[]);
    assert_eq!(single.parent(), None);
    assert_eq!(single.file_name(), Some(single.clone()));
    assert_eq!(single.root(), None);

    let root = fs.path("/", &[]);
    assert!(root.is_root());
    assert_eq!(root.name_count(), 0);
    assert_eq!(root.file_name(), None);
    assert_eq!(root.parent(), None);

    assert_eq!(fs.path("a", &["b", "c"]).as_str(), "a/b/c");
    Ok(())
}

#[test]
fn equality_requires_the_owning_filesystem() -> Result<()> {
    let env = test_env()?;
    let fs = filesystem(&env);
    let first = fs.path("a/b", &[]);
    let second = fs.path("a/b", &[]);
    assert_eq!(first, second);

    // A second provider projects the same release through a distinct
    // filesystem instance; its paths are not equal to ours.
    let repository = Arc::clone(fs.repository());
    let other_provider = ReleaseFileSystemProvider::new(repository);
    let other_fs = other_provider.new_filesystem(&env.uri)?;
    assert_ne!(first, other_fs.path("a/b", &[]));
    Ok(())
}

#[test]
fn provider_resolves_caches_and_validates() -> Result<()> {
    let env = test_env()?;

    let path = env.provider.path(&env.uri)?;
    assert_eq!(path.as_str(), "m-1.0.jar");

    // The filesystem is cached per identifier.
    let first = env.provider.new_filesystem(&env.uri)?;
    let second = env.provider.new_filesystem(&env.uri)?;
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first, &env.provider.filesystem(&env.uri)?));

    for raw in [
        "other.scheme:1",
        "depot.release:abc",
        "depot.release:1:embedded.jar",
    ] {
        let uri = Url::parse(raw)?;
        assert!(!env.provider.is_release(&uri));
        let err = env.provider.path(&uri).unwrap_err();
        assert!(
            matches!(kind_of(&err), Some(RepositoryError::InvalidArgument(_))),
            "expected InvalidArgument for {raw}"
        );
    }

    let gone = Url::parse("depot.release:9999")?;
    let err = env.provider.path(&gone).unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::NotFound(_))));
    Ok(())
}

#[test]
fn filesystem_close_evicts_the_cache_entry() -> Result<()> {
    let env = test_env()?;
    let fs = filesystem(&env);
    assert!(fs.is_open());

    fs.close();
    assert!(!fs.is_open());
    let err = env.provider.filesystem(&env.uri).unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::NotFound(_))));

    // Resolution after close builds a fresh instance.
    let reopened = filesystem(&env);
    assert!(!Arc::ptr_eq(&fs, &reopened));
    assert!(reopened.is_open());
    Ok(())
}

#[test]
fn every_mutation_hits_the_read_only_wall() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;
    let fs = path.filesystem().clone();
    assert!(fs.is_read_only());

    let err = env.provider.delete(&path).unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));

    let err = env.provider.create_directory(&fs.path("/x", &[])).unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));
    let err = env.provider.create_directory(&fs.path("/", &[])).unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::AlreadyExists(_))
    ));

    let other = fs.path("elsewhere.jar", &[]);
    env.provider.copy(&path, &path)?;
    let err = env.provider.copy(&path, &other).unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));
    let err = env.provider.rename(&path, &other).unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));

    let writable = ChannelOptions {
        read: true,
        write: true,
        ..ChannelOptions::default()
    };
    let err = env.provider.new_byte_channel(&path, &writable).unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));

    let create_new = ChannelOptions {
        read: true,
        create_new: true,
        ..ChannelOptions::default()
    };
    let err = env
        .provider
        .new_byte_channel(&path, &create_new)
        .unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::AlreadyExists(_))
    ));

    let append = ChannelOptions {
        read: true,
        append: true,
        ..ChannelOptions::default()
    };
    let err = env.provider.new_byte_channel(&path, &append).unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn check_access_grants_read_and_denies_the_rest() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;

    env.provider.check_access(&path, &[AccessMode::Read])?;
    let err = env
        .provider
        .check_access(&path, &[AccessMode::Read, AccessMode::Write])
        .unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::AccessDenied(_))
    ));
    let err = env
        .provider
        .check_access(&path, &[AccessMode::Execute])
        .unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::AccessDenied(_))
    ));

    let ghost = path.filesystem().path("ghost.jar", &[]);
    let err = env
        .provider
        .check_access(&ghost, &[AccessMode::Read])
        .unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::NotFound(_))));
    Ok(())
}

#[test]
fn attributes_read_through_and_refuse_new_times() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;

    let attributes = env
        .provider
        .read_attributes(&path, AttributeViewKind::Basic)?;
    assert_eq!(attributes.size(), 3);
    assert!(attributes.is_regular_file());
    assert_eq!(attributes.file_key(), "m-1.0.jar");

    let view = env.provider.attribute_view(&path, AttributeViewKind::Basic);
    assert_eq!(view.name(), "basic");
    // Re-asserting the stored time is a no-op; any new value is a mutation.
    view.set_times(Some(attributes.modified()), None, None)?;
    let err = view
        .set_times(Some(attributes.modified() + Duration::from_secs(1)), None, None)
        .unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));
    Ok(())
}

#[test]
fn channel_through_the_provider_reads_the_content() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;

    let mut channel = env
        .provider
        .new_byte_channel(&path, &ChannelOptions::read_only())?;
    let mut content = Vec::new();
    channel.read_to_end(&mut content)?;
    assert_eq!(content, b"abc");
    channel.close()?;
    Ok(())
}

#[test]
fn directory_stream_yields_one_entry_once() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;
    let stream = env.provider.new_directory_stream(&path);

    let entries = stream.entries()?;
    assert_eq!(entries, vec![env.provider.path(&env.uri)?]);

    let err = stream.entries().unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::InvalidState(_))
    ));
    Ok(())
}

#[test]
fn directory_stream_deletes_fail_up_front() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;
    let stream = env.provider.new_directory_stream(&path);

    let err = stream
        .delete_file(&path.filesystem().path("m-1.0.jar", &[]))
        .unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));
    let err = stream
        .delete_directory(&path.filesystem().path("/", &[]))
        .unwrap_err();
    assert!(matches!(kind_of(&err), Some(RepositoryError::ReadOnly)));
    Ok(())
}

#[test]
fn closed_directory_stream_rejects_every_operation() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;
    let stream = env.provider.new_directory_stream(&path);

    let view = stream.attribute_view(AttributeViewKind::Basic);
    assert_eq!(view.read_attributes()?.size(), 3);

    stream.close();
    assert!(!stream.is_open());

    let err = view.read_attributes().unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::InvalidState(_))
    ));
    let err = stream
        .new_byte_channel(&path, &ChannelOptions::read_only())
        .unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::InvalidState(_))
    ));
    let err = stream.new_directory_stream(&path).map(|_| ()).unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::InvalidState(_))
    ));
    Ok(())
}

#[test]
fn stream_on_a_closed_filesystem_does_not_enumerate() -> Result<()> {
    let env = test_env()?;
    let path = env.provider.path(&env.uri)?;
    let stream = env.provider.new_directory_stream(&path);

    path.filesystem().close();
    let err = stream.entries().unwrap_err();
    assert!(matches!(
        kind_of(&err),
        Some(RepositoryError::InvalidState(_))
    ));
    Ok(())
}
