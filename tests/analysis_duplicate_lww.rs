
use serde_json::json;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn duplicate_responses_resolve_last_write_wins() {
    let workspace = temp_dir("sociogram-duplicate-lww");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let group = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "groups.create",
        json!({ "name": "LWW" }),
    );
    let group_id = group
        .get("groupId")
        .and_then(|v| v.as_str())
        .expect("groupId")
        .to_string();

    let mut ids = Vec::new();
    for (i, name) in ["Ada", "Ben", "Cam"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({ "groupId": group_id, "lastName": name, "firstName": name }),
        );
        ids.push(
            created
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }
    let (ada, ben, cam) = (&ids[0], &ids[1], &ids[2]);

    let question = request_ok(
        &mut stdin,
        &mut reader,
        "q",
        "questions.create",
        json!({ "position": 1, "text": "Best friend?", "role": "positive" }),
    );
    let question_id = question
        .get("questionId")
        .and_then(|v| v.as_str())
        .expect("questionId")
        .to_string();

    // Current answer at T+100.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r1",
        "responses.submit",
        json!({
            "groupId": group_id,
            "studentId": ada,
            "questionId": question_id,
            "nominatedStudentIds": [ben],
            "submittedAt": "2026-03-01T10:01:40Z"
        }),
    );
    // Stale duplicate at T+50 must not displace it.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r2",
        "responses.submit",
        json!({
            "groupId": group_id,
            "studentId": ada,
            "questionId": question_id,
            "nominatedStudentIds": [cam],
            "submittedAt": "2026-03-01T10:00:50Z"
        }),
    );

    let received = |analysis: &serde_json::Value, student: &str| -> u64 {
        analysis
            .get("perStudent")
            .and_then(|v| v.as_array())
            .expect("perStudent")
            .iter()
            .find(|s| s.get("studentId").and_then(|v| v.as_str()) == Some(student))
            .and_then(|s| s.get("positiveReceived"))
            .and_then(|v| v.as_u64())
            .expect("positiveReceived")
    };

    let first = request_ok(
        &mut stdin,
        &mut reader,
        "an1",
        "analysis.group",
        json!({ "groupId": group_id }),
    );
    assert_eq!(received(&first, ben), 1);
    assert_eq!(received(&first, cam), 0);
    assert_eq!(
        first
            .get("summary")
            .and_then(|s| s.get("duplicatesResolved"))
            .and_then(|v| v.as_u64()),
        Some(1)
    );

    // A genuinely newer answer replaces the old one.
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "r3",
        "responses.submit",
        json!({
            "groupId": group_id,
            "studentId": ada,
            "questionId": question_id,
            "nominatedStudentIds": [cam],
            "submittedAt": "2026-03-01T10:05:00Z"
        }),
    );
    let second = request_ok(
        &mut stdin,
        &mut reader,
        "an2",
        "analysis.group",
        json!({ "groupId": group_id }),
    );
    assert_eq!(received(&second, ben), 0);
    assert_eq!(received(&second, cam), 1);
    assert_eq!(
        second
            .get("summary")
            .and_then(|s| s.get("duplicatesResolved"))
            .and_then(|v| v.as_u64()),
        Some(2)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
