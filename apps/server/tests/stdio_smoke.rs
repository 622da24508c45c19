use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Command, Stdio};

/// Drives the stdio transport end-to-end (§6.1): `initialize`, a real
/// `activate_project` against an empty repo (so reconciliation needs no
/// inference sidecar), an unknown method, and a tool call missing a required
/// parameter, all over one piped subprocess.
#[test]
fn stdio_smoke() {
    let bin = env!("CARGO_BIN_EXE_mdit_docs_server");
    let repo = tempfile::tempdir().expect("tempdir");

    let mut child = Command::new(bin)
        .arg("--repo-path")
        .arg(repo.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn mdit-docs-server");

    {
        let stdin = child.stdin.as_mut().expect("child stdin");

        writeln!(stdin, "{}", serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "initialize" })).unwrap();

        writeln!(
            stdin,
            "{}",
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "activate_project",
                "params": {
                    "project_name": "demo-repo",
                    "branch_name": "main",
                    "absolute_path": repo.path(),
                }
            })
        )
        .unwrap();

        writeln!(stdin, "{}", serde_json::json!({ "jsonrpc": "2.0", "id": 3, "method": "not_a_real_tool" })).unwrap();

        writeln!(stdin, "{}", serde_json::json!({ "jsonrpc": "2.0", "id": 4, "method": "index_document", "params": {} })).unwrap();
    }
    drop(child.stdin.take());

    let stdout = child.stdout.take().expect("child stdout");
    let reader = BufReader::new(stdout);
    let mut replies: HashMap<i64, serde_json::Value> = HashMap::new();
    for line in reader.lines() {
        let line = line.expect("read stdout line");
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line).expect("stdout line is json");
        let id = value.get("id").and_then(|v| v.as_i64()).expect("response id");
        replies.insert(id, value);
        if replies.len() >= 4 {
            break;
        }
    }

    let status = child.wait().expect("wait on child");
    assert!(status.success(), "server should exit cleanly on stdin close");

    let initialize = replies.get(&1).expect("initialize reply");
    let tools = initialize
        .get("result")
        .and_then(|r| r.get("capabilities"))
        .and_then(|c| c.get("tools"))
        .and_then(|t| t.as_array())
        .expect("tools array");
    let names: Vec<&str> = tools.iter().filter_map(|t| t.get("name").and_then(|n| n.as_str())).collect();
    assert!(names.contains(&"activate_project"));
    assert!(names.contains(&"rag_query"));

    let activation = replies.get(&2).expect("activate_project reply");
    let result = activation.get("result").expect("activate_project result");
    assert_eq!(result.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert_eq!(result.get("project_name").and_then(|v| v.as_str()), Some("demo-repo"));
    assert_eq!(
        result.get("reconciliation").and_then(|r| r.get("indexed")).and_then(|v| v.as_u64()),
        Some(0),
        "an empty repo has nothing to reconcile"
    );

    let unknown_method = replies.get(&3).expect("unknown method reply");
    assert_eq!(unknown_method.get("error").and_then(|e| e.get("code")).and_then(|c| c.as_i64()), Some(-32601));

    let missing_param = replies.get(&4).expect("index_document reply");
    let envelope = missing_param.get("result").expect("application error envelope");
    assert_eq!(envelope.get("error").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(envelope.get("code").and_then(|v| v.as_str()), Some("INVALID_PARAMS"));
}
