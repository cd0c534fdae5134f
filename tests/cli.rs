//! End-to-end exercises of the `sifrun` binary that don't require a
//! privileged mount/namespace environment: argument validation, the
//! image cache, overlay image management, and the instance registry on an
//! empty store. Full launch scenarios (S1-S6) additionally need a real
//! low-level runtime and namespace privileges; those invariants (mount
//! ordering/undo, exit-code mapping, cache atomicity, instance lifecycle)
//! are exercised without privilege requirements by the mockable-boundary
//! unit tests in `src/rootfs.rs`, `src/supervisor.rs`, `src/cache.rs`, and
//! `src/instance.rs` instead.

mod common;

use common::{stdout, Harness};

#[test]
fn writable_and_writable_tmpfs_conflict_is_rejected() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let output = h.run(&["exec", "dir:/nonexistent", "--writable", "--writable-tmpfs", "--", "true"])?;
    assert_eq!(output.status.code(), Some(255));
    Ok(())
}

#[test]
fn compat_and_no_compat_conflict_is_rejected() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let output = h.run(&["exec", "dir:/nonexistent", "--compat", "--no-compat", "--", "true"])?;
    assert_eq!(output.status.code(), Some(255));
    Ok(())
}

#[test]
fn instance_start_rejects_an_empty_name() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let output = h.run(&["instance", "start", "dir:/nonexistent", ""])?;
    assert_eq!(output.status.code(), Some(255));
    Ok(())
}

#[test]
fn unimplemented_verbs_exit_with_the_launcher_error_code() -> anyhow::Result<()> {
    let h = Harness::new()?;
    for args in [
        vec!["build", "target", "build.yaml"],
        vec!["push", "file.sif", "oci:registry.example/repo:tag"],
        vec!["sign", "file.sif"],
        vec!["verify", "file.sif"],
        vec!["remote", "list"],
        vec!["config", "global"],
    ] {
        let refs: Vec<&str> = args.iter().map(|s| s.as_ref()).collect();
        let output = h.run(&refs)?;
        assert_eq!(output.status.code(), Some(255), "args: {:?}", refs);
    }
    Ok(())
}

#[test]
fn cache_list_and_clean_on_an_empty_cache() -> anyhow::Result<()> {
    let h = Harness::new()?;

    let list = h.run(&["cache", "list"])?;
    assert!(list.status.success());
    assert!(stdout(&list).is_empty());

    let clean = h.run(&["cache", "clean"])?;
    assert!(clean.status.success());
    assert!(stdout(&clean).contains("removed 0 cached artifact(s)"));
    Ok(())
}

#[test]
fn pull_resolves_a_local_directory_reference() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let image_dir = h.dir.path().join("image");
    std::fs::create_dir_all(&image_dir)?;

    let reference = format!("dir:{}", image_dir.display());
    let output = h.run(&["pull", "myimage", &reference])?;
    assert!(output.status.success(), "stderr: {}", stdout(&output));
    assert!(stdout(&output).contains("pulled myimage to"));
    Ok(())
}

#[test]
fn pull_of_a_missing_path_is_not_found() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let output = h.run(&["pull", "myimage", "dir:/no/such/path-xyz"])?;
    assert_eq!(output.status.code(), Some(255));
    Ok(())
}

#[test]
fn instance_list_on_an_empty_registry_is_silent_and_succeeds() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let output = h.run(&["instance", "list"])?;
    assert!(output.status.success());
    assert!(stdout(&output).is_empty());
    Ok(())
}

#[test]
fn instance_stats_for_a_missing_instance_fails() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let output = h.run(&["instance", "stats", "no-such-instance"])?;
    assert_eq!(output.status.code(), Some(255));
    Ok(())
}

#[test]
fn overlay_lifecycle_create_sync_seal() -> anyhow::Result<()> {
    let h = Harness::new()?;
    let image = h.dir.path().join("overlay.img");

    let create = h.run(&["overlay", "create", image.to_str().unwrap(), "--size-mb", "8"])?;
    assert!(create.status.success(), "stderr: {}", stdout(&create));
    assert!(image.is_file());
    assert_eq!(image.metadata()?.len(), 8 * 1024 * 1024);

    let sync = h.run(&["overlay", "sync", image.to_str().unwrap()])?;
    assert!(sync.status.success());

    let seal = h.run(&["overlay", "seal", image.to_str().unwrap()])?;
    assert!(seal.status.success());
    assert!(image.metadata()?.permissions().readonly());

    Ok(())
}
