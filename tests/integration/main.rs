//! Integration tests for invenv

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    /// invenv isolated from the user's config and cache
    fn invenv(home: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("invenv");
        cmd.env("INVENV_CONFIG", home.join("config.toml"))
            .env("INVENV_CACHE_DIR", home.join("envs"))
            .env_remove("RUST_LOG");
        cmd
    }

    fn backdate(dir: &Path, age: Duration) {
        let handle = std::fs::File::open(dir).unwrap();
        handle.set_modified(SystemTime::now() - age).unwrap();
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Run Python scripts in cached"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("invenv"));
    }

    #[test]
    fn run_help_shows_examples() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .args(["run", "--help"])
            .assert()
            .success()
            .stdout(predicate::str::contains("DEBUG=1"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show_defaults() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[lock]"))
            .stdout(predicate::str::contains("max_attempts = 300"));
    }

    #[test]
    fn config_init_writes_file() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .args(["config", "init"])
            .assert()
            .success();
        assert!(home.path().join("config.toml").exists());
    }

    #[test]
    fn invalid_config_fails() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("config.toml"), "[cache]\ngc_days = \"soon\"\n").unwrap();

        invenv(home.path())
            .args(["cache", "list"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn cache_list_empty() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No environments"));

        invenv(home.path())
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));
    }

    #[test]
    fn cache_list_shows_broken_and_locked() {
        let home = TempDir::new().unwrap();
        let envs = home.path().join("envs");
        std::fs::create_dir_all(envs.join("aaaaaaaaaaaaaaaa")).unwrap();
        std::fs::create_dir_all(envs.join("bbbbbbbbbbbbbbbb")).unwrap();
        std::fs::File::create(envs.join("bbbbbbbbbbbbbbbb.lock")).unwrap();

        invenv(home.path())
            .args(["cache", "list", "--format", "plain"])
            .assert()
            .success()
            .stdout(predicate::str::contains("aaaaaaaaaaaaaaaa"))
            .stdout(predicate::str::contains("bbbbbbbbbbbbbbbb"));

        invenv(home.path())
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("broken"))
            .stdout(predicate::str::contains("building"))
            .stdout(predicate::str::contains("Total: 2"));
    }

    #[test]
    fn cache_gc_removes_old_unlocked() {
        let home = TempDir::new().unwrap();
        let envs = home.path().join("envs");
        let old = envs.join("aaaaaaaaaaaaaaaa");
        let locked = envs.join("bbbbbbbbbbbbbbbb");
        let fresh = envs.join("cccccccccccccccc");
        for dir in [&old, &locked, &fresh] {
            std::fs::create_dir_all(dir).unwrap();
        }
        backdate(&old, Duration::from_secs(30 * 24 * 3600));
        backdate(&locked, Duration::from_secs(30 * 24 * 3600));
        std::fs::File::create(envs.join("bbbbbbbbbbbbbbbb.lock")).unwrap();

        invenv(home.path())
            .args(["cache", "gc", "--dry-run"])
            .assert()
            .success()
            .stdout(predicate::str::contains("aaaaaaaaaaaaaaaa"))
            .stdout(predicate::str::contains("Dry run"));
        assert!(old.exists());

        invenv(home.path())
            .args(["cache", "gc"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 1"))
            .stdout(predicate::str::contains("locked"));

        assert!(!old.exists());
        assert!(locked.exists());
        assert!(fresh.exists());
    }

    #[test]
    fn cache_gc_disabled() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .args(["cache", "gc", "--days", "0"])
            .assert()
            .success()
            .stdout(predicate::str::contains("disabled"));
    }

    #[test]
    fn cache_clear_with_yes() {
        let home = TempDir::new().unwrap();
        let env = home.path().join("envs").join("aaaaaaaaaaaaaaaa");
        std::fs::create_dir_all(env.join("bin")).unwrap();

        invenv(home.path())
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared 1"));
        assert!(!env.exists());
    }

    #[test]
    fn cache_clear_without_terminal_aborts() {
        let home = TempDir::new().unwrap();
        let env = home.path().join("envs").join("aaaaaaaaaaaaaaaa");
        std::fs::create_dir_all(&env).unwrap();

        invenv(home.path())
            .args(["cache", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Aborted"));
        assert!(env.exists());
    }

    #[test]
    fn run_missing_script() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .current_dir(home.path())
            .args(["run", "--", "missing.py"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Script not found"));
    }

    #[test]
    fn run_requires_script_name() {
        let home = TempDir::new().unwrap();
        invenv(home.path())
            .args(["run", "--", "DEBUG=1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no script name provided"));
    }

    #[test]
    fn which_missing_requirements_file() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("app.py"), "print('hi')\n").unwrap();

        invenv(home.path())
            .current_dir(home.path())
            .args(["which", "-r", "absent.txt", "app.py"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Requirements file not found"));
    }

    #[test]
    fn unknown_interpreter() {
        let home = TempDir::new().unwrap();
        std::fs::write(home.path().join("app.py"), "print('hi')\n").unwrap();

        invenv(home.path())
            .current_dir(home.path())
            .args(["which", "-p", "python-does-not-exist-9.99", "app.py"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Python interpreter not found"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn init_refuses_project_directory() {
        let home = TempDir::new().unwrap();
        let project = home.path().join("project");
        std::fs::create_dir(&project).unwrap();
        std::fs::write(project.join("main.py"), "print('hi')\n").unwrap();

        for dir in [".", ".."] {
            invenv(home.path())
                .current_dir(&project)
                .args(["init", "--dir", dir])
                .assert()
                .failure()
                .stderr(predicate::str::contains("cannot hold an environment"));
        }
        assert!(project.join("main.py").exists());
    }

    /// Whether a python3 able to create environments offline is installed
    fn python_with_venv() -> bool {
        std::process::Command::new("python3")
            .args(["-c", "import venv, ensurepip"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[test]
    fn run_builds_once_and_reuses() {
        if !python_with_venv() {
            eprintln!("skipping: python3 with venv not available");
            return;
        }

        let home = TempDir::new().unwrap();
        let script = home.path().join("greet.py");
        std::fs::write(
            &script,
            "import os, sys\nprint(os.environ['GREETING'], sys.argv[1], sys.prefix)\n",
        )
        .unwrap();

        let first = invenv(home.path())
            .current_dir(home.path())
            .args(["run", "--", "GREETING=hello", "greet.py", "world"])
            .assert()
            .success()
            .stdout(predicate::str::contains("hello world"))
            .get_output()
            .stdout
            .clone();

        invenv(home.path())
            .current_dir(home.path())
            .args(["which", "greet.py"])
            .assert()
            .success()
            .stdout(predicate::str::contains(home.path().join("envs").to_string_lossy().into_owned()));

        // Second run reuses the same environment
        let second = invenv(home.path())
            .current_dir(home.path())
            .args(["run", "--", "GREETING=hello", "greet.py", "world"])
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        assert_eq!(first, second);

        let envs: Vec<_> = std::fs::read_dir(home.path().join("envs"))
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.path().is_dir())
            .collect();
        assert_eq!(envs.len(), 1);
        assert!(!envs[0].path().with_extension("lock").exists());
    }
}
