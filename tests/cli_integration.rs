use std::process::Command;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_oxipack").to_string()
}

#[test]
fn cli_diff_patch_roundtrip() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base.txt");
    let target = dir.path().join("target.txt");
    let delta = dir.path().join("delta.bin");
    let output = dir.path().join("output.txt");

    std::fs::write(&base, b"text file line 1\ntext file line 2\na").unwrap();
    std::fs::write(&target, b"text file line 2\ntext file line 1\nab").unwrap();

    let st = Command::new(bin())
        .arg("diff")
        .arg(&base)
        .arg(&target)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(
        hex::encode(std::fs::read(&delta).unwrap()),
        "23249111119011026162"
    );

    let st = Command::new(bin())
        .arg("patch")
        .arg(&base)
        .arg(&delta)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(
        std::fs::read(&output).unwrap(),
        std::fs::read(&target).unwrap()
    );
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base.txt");
    let delta = dir.path().join("delta.bin");
    std::fs::write(&base, b"same\n").unwrap();
    std::fs::write(&delta, b"keep me").unwrap();

    let st = Command::new(bin())
        .arg("diff")
        .arg(&base)
        .arg(&base)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(!st.success());
    assert_eq!(std::fs::read(&delta).unwrap(), b"keep me");

    let st = Command::new(bin())
        .args(["--force", "diff"])
        .arg(&base)
        .arg(&base)
        .arg(&delta)
        .status()
        .unwrap();
    assert!(st.success());
    assert_ne!(std::fs::read(&delta).unwrap(), b"keep me");
}

#[test]
fn cli_patch_rejects_bad_delta() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base.txt");
    let delta = dir.path().join("delta.bin");
    std::fs::write(&base, b"abc").unwrap();
    std::fs::write(&delta, [3u8, 1, 0]).unwrap();

    let out = Command::new(bin())
        .arg("patch")
        .arg(&base)
        .arg(&delta)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("opcode"));
}

#[test]
fn cli_hash_object_matches_git() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("hello.txt");
    let objects = dir.path().join("objects");
    std::fs::write(&input, b"hello\n").unwrap();

    let out = Command::new(bin())
        .arg("hash-object")
        .arg("-w")
        .arg(&objects)
        .arg(&input)
        .output()
        .unwrap();
    assert!(out.status.success());
    assert_eq!(
        String::from_utf8_lossy(&out.stdout).trim(),
        "ce013625030ba8dba906f756967f9e9ca394464a"
    );
    assert!(objects
        .join("ce")
        .join("013625030ba8dba906f756967f9e9ca394464a")
        .is_file());
}

#[test]
fn cli_hash_object_validates_type() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("not-a-commit");
    std::fs::write(&input, b"hello\n").unwrap();

    let st = Command::new(bin())
        .args(["hash-object", "-t", "commit"])
        .arg(&input)
        .status()
        .unwrap();
    assert!(!st.success());

    let st = Command::new(bin())
        .args(["-q", "hash-object", "-t", "commit", "--literally"])
        .arg(&input)
        .status()
        .unwrap();
    assert!(st.success());
}

#[test]
fn cli_pack_verify_unpack() {
    let dir = tempdir().unwrap();
    let first = dir.path().join("first.txt");
    let second = dir.path().join("second.txt");
    let pack = dir.path().join("out.pack");
    let objects = dir.path().join("objects");

    let text = "some line of text\n".repeat(200);
    std::fs::write(&first, &text).unwrap();
    std::fs::write(&second, text + "one more line\n").unwrap();

    let st = Command::new(bin())
        .args(["pack", "--window", "4", "-o"])
        .arg(&pack)
        .arg(&first)
        .arg(&second)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin())
        .arg("verify-pack")
        .arg(&pack)
        .output()
        .unwrap();
    assert!(out.status.success());
    let listing = String::from_utf8_lossy(&out.stdout);
    assert!(listing.contains("ofs-delta"), "{listing}");
    assert!(listing.trim_end().ends_with(": ok"), "{listing}");

    let out = Command::new(bin())
        .arg("unpack")
        .arg("--objects")
        .arg(&objects)
        .arg(&pack)
        .output()
        .unwrap();
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.lines().count(), 2);
    for line in stdout.lines() {
        let id = line.split_whitespace().next().unwrap();
        assert!(objects.join(&id[..2]).join(&id[2..]).is_file());
    }
}

#[test]
fn cli_verify_pack_rejects_corruption() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("a.txt");
    let pack = dir.path().join("a.pack");
    std::fs::write(&input, b"payload\n").unwrap();

    let st = Command::new(bin())
        .args(["-q", "pack", "-o"])
        .arg(&pack)
        .arg(&input)
        .status()
        .unwrap();
    assert!(st.success());

    let mut bytes = std::fs::read(&pack).unwrap();
    bytes[14] ^= 0xFF;
    std::fs::write(&pack, bytes).unwrap();

    let out = Command::new(bin())
        .arg("verify-pack")
        .arg(&pack)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("checksum"));
}

#[test]
fn cli_json_stats() {
    let dir = tempdir().unwrap();
    let base = dir.path().join("base.txt");
    std::fs::write(&base, b"stats\n").unwrap();

    let out = Command::new(bin())
        .args(["--json", "-q", "diff"])
        .arg(&base)
        .arg(&base)
        .arg(dir.path().join("d.bin"))
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(json["command"], "diff");
    assert_eq!(json["target_size"], 6);
}
