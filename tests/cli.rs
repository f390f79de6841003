use std::fs;
use std::process::Command;
use tempfile::tempdir;

fn railway() -> Command {
    Command::new(env!("CARGO_BIN_EXE_railway"))
}

fn write_program(dir: &tempfile::TempDir, name: &str, source: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).expect("write program");
    path
}

#[test]
fn prints_in_presentation_order() {
    let dir = tempdir().expect("tempdir");
    let path = write_program(
        &dir,
        "hello.rail",
        "func main(argv)()\n\
         println(\"sum:\", 1 + 1)\n\
         print(\"a\")\n\
         print(\"b\")\n\
         println(\"\")\n\
         println([1, 2, 1 / 2])\n\
         return ()\n",
    );
    let output = railway().arg(&path).output().expect("run railway");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        "sum: 2\nab\n[1, 2, 1/2]\n"
    );
}

#[test]
fn integer_flags_are_pushed_onto_argv() {
    let dir = tempdir().expect("tempdir");
    let path = write_program(
        &dir,
        "args.rail",
        "func main(argv)()\n\
         println(argv[0] + argv[1])\n\
         return ()\n",
    );
    let output = railway()
        .arg(&path)
        .args(["-n", "7", "-n", "35"])
        .output()
        .expect("run railway");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "42\n");
}

#[test]
fn typed_data_files_load_as_rational_arrays() {
    let dir = tempdir().expect("tempdir");
    let data: Vec<u8> = [1i32, -2, 3].iter().flat_map(|v| v.to_le_bytes()).collect();
    let data_path = dir.path().join("values.bin");
    fs::write(&data_path, data).expect("write data");
    let path = write_program(
        &dir,
        "data.rail",
        "func main(argv)()\n\
         println(#argv[0], argv[0][1])\n\
         return ()\n",
    );
    let output = railway()
        .arg(&path)
        .arg("--i32")
        .arg(&data_path)
        .output()
        .expect("run railway");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "3 -2\n");
}

#[test]
fn runtime_errors_exit_nonzero() {
    let dir = tempdir().expect("tempdir");
    let path = write_program(
        &dir,
        "broken.rail",
        "func main(argv)()\n\
         let x = 1\n\
         unlet x = 2\n\
         return ()\n",
    );
    let output = railway().arg(&path).output().expect("run railway");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Reversibility violation"), "{}", stderr);
}

#[test]
fn syntax_errors_exit_nonzero() {
    let dir = tempdir().expect("tempdir");
    let path = write_program(&dir, "bad.rail", "func main(\nlet\n");
    let output = railway().arg(&path).output().expect("run railway");
    assert!(!output.status.success());
}

#[test]
fn imported_modules_are_qualified_by_alias() {
    let dir = tempdir().expect("tempdir");
    write_program(
        &dir,
        "mathlib.rail",
        "func triple()(x)\n\
         x *= 3\n\
         return (x)\n",
    );
    let path = write_program(
        &dir,
        "root.rail",
        "import \"mathlib.rail\" as lib\n\
         func main(argv)()\n\
         let x = 5\n\
         (x) <= call lib.triple()\n\
         unlet x = 15\n\
         return ()\n",
    );
    let output = railway().arg(&path).output().expect("run railway");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
}
