use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::error::Error;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

const FACT: &str = r#"
    fn fact(n: int) -> int {
        if (n <= 1) { return 1; }
        return n * fact(n - 1);
    }
    print_int(fact(3));
    fact(6)
"#;

#[test]
fn runs_a_source_file_and_prints_the_result() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("fact.hss");
    fs::write(&script, FACT)?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(&script);
    cmd.assert().success().stdout("6\n720\n");
    Ok(())
}

#[test]
fn compiled_modules_run_like_their_source() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("fact.hss");
    fs::write(&script, FACT)?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.args(["compile"]).arg(&script);
    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Emitted bytecode to"));

    let module = dir.path().join("fact.hssb");
    let bytes = fs::read(&module)?;
    assert_eq!(&bytes[..4], b"HSSB");

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(&module);
    cmd.assert().success().stdout("6\n720\n");
    Ok(())
}

#[test]
fn check_reports_type_errors() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("bad.hss");
    fs::write(&script, "var x = 1;\nvar y = x + 2.5;\n")?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg("check").arg(&script);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Error:").and(predicate::str::contains("mismatched operand types")));

    let good = dir.path().join("good.hss");
    fs::write(&good, "1 + 2")?;
    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg("check").arg(&good);
    cmd.assert().success().stderr(predicate::str::contains("ok"));
    Ok(())
}

#[test]
fn disasm_lists_instructions() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("sum.hss");
    fs::write(&script, "1 + 20")?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg("disasm").arg(&script);
    cmd.assert().success().stdout(
        predicate::str::contains("@0000  LITERAL_I 1")
            .and(predicate::str::contains("@0003  LITERAL_I 20"))
            .and(predicate::str::contains("ADD_I"))
            .and(predicate::str::contains("; result int")),
    );
    Ok(())
}

#[test]
fn disasm_shows_native_signatures() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("abs.hss");
    fs::write(&script, "print_int(abs(-3));")?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg("disasm").arg(&script);
    cmd.assert().success().stdout(
        predicate::str::contains("; native #0 print_int(int)\n")
            .and(predicate::str::contains("; native #3 abs(int) -> int"))
            .and(predicate::str::contains("CALL_EXT 3")),
    );
    Ok(())
}

#[test]
fn runtime_faults_exit_non_zero() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("div.hss");
    fs::write(&script, "var z = 0; 10 / z")?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(&script);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("integer division by zero"));
    Ok(())
}

#[test]
fn step_budget_and_config_file() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("spin.hss");
    fs::write(&script, "var i = 0; while (true) { i = i + 1; }")?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(&script).args(["--max-steps", "500"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("step budget of 500"));

    let config = dir.path().join("vm.toml");
    fs::write(&config, "max_steps = 300\nbatch_size = 10\n")?;
    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(&script).arg("--config").arg(&config);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("step budget of 300"));

    fs::write(&config, "stack = 1\n")?;
    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(&script).arg("--config").arg(&config);
    cmd.assert().failure().stderr(predicate::str::contains("unknown field"));
    Ok(())
}

#[test]
fn tiny_stacks_overflow() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let script = dir.path().join("deep.hss");
    fs::write(&script, "fn down(n: int) -> int { return down(n + 1); } down(0)")?;

    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(&script).args(["--stack-size", "32"]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("variable frame overflow"));
    Ok(())
}

#[test]
fn rejects_parent_dir_paths() -> Result<(), Box<dyn Error>> {
    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg("../secret.hss");
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Parent directory components"));
    Ok(())
}

#[test]
fn missing_files_are_reported() -> Result<(), Box<dyn Error>> {
    let dir = tempdir()?;
    let mut cmd = Command::cargo_bin("hss")?;
    cmd.arg(dir.path().join("nope.hss"));
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
    Ok(())
}
