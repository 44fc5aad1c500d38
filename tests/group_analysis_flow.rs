
use serde_json::json;
use std::collections::HashMap;
use test_support::{request_ok, spawn_sidecar, temp_dir};

#[test]
fn four_student_group_classifies_per_received_nominations() {
    let workspace = temp_dir("sociogram-analysis-flow");
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
        json!({ "name": "4B", "grade": "4" }),
    );
    let group_id = group
        .get("groupId")
        .and_then(|v| v.as_str())
        .expect("groupId")
        .to_string();

    let mut student_ids: HashMap<&str, String> = HashMap::new();
    for (i, name) in ["Ada", "Ben", "Cam", "Dot"].iter().enumerate() {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "groupId": group_id,
                "lastName": name,
                "firstName": name,
            }),
        );
        student_ids.insert(
            name,
            created
                .get("studentId")
                .and_then(|v| v.as_str())
                .expect("studentId")
                .to_string(),
        );
    }

    let question = request_ok(
        &mut stdin,
        &mut reader,
        "q1",
        "questions.create",
        json!({
            "position": 1,
            "text": "Who do you most like to spend time with?",
            "role": "positive"
        }),
    );
    let question_id = question
        .get("questionId")
        .and_then(|v| v.as_str())
        .expect("questionId")
        .to_string();

    // Ada -> [Ben, Cam]; Ben -> [Ada]; Cam -> []; Dot -> [].
    let submissions = [
        ("Ada", vec!["Ben", "Cam"]),
        ("Ben", vec!["Ada"]),
        ("Cam", vec![]),
        ("Dot", vec![]),
    ];
    for (i, (who, nominees)) in submissions.iter().enumerate() {
        let nominated: Vec<&str> = nominees.iter().map(|n| student_ids[n].as_str()).collect();
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("r{}", i),
            "responses.submit",
            json!({
                "groupId": group_id,
                "studentId": student_ids[who],
                "questionId": question_id,
                "nominatedStudentIds": nominated
            }),
        );
    }

    let analysis = request_ok(
        &mut stdin,
        &mut reader,
        "an1",
        "analysis.group",
        json!({ "groupId": group_id }),
    );

    let per_student = analysis
        .get("perStudent")
        .and_then(|v| v.as_array())
        .expect("perStudent");
    assert_eq!(per_student.len(), 4);

    let status_of = |name: &str| -> String {
        per_student
            .iter()
            .find(|s| s.get("studentId").and_then(|v| v.as_str()) == Some(&student_ids[name]))
            .and_then(|s| s.get("sociometricStatus"))
            .and_then(|v| v.as_str())
            .expect("status")
            .to_string()
    };
    assert_eq!(status_of("Ada"), "popular");
    assert_eq!(status_of("Ben"), "popular");
    assert_eq!(status_of("Cam"), "popular");
    assert_eq!(status_of("Dot"), "isolated");

    let summary = analysis.get("summary").expect("summary");
    let cohesion = summary
        .get("cohesionIndex")
        .and_then(|v| v.as_f64())
        .expect("cohesionIndex");
    assert!((cohesion - 1.0 / 3.0).abs() < 1e-9);
    assert_eq!(
        summary.get("participationRate").and_then(|v| v.as_f64()),
        Some(1.0)
    );
    assert_eq!(
        summary
            .get("warnings")
            .and_then(|v| v.as_array())
            .map(Vec::len),
        Some(0)
    );
    assert_eq!(
        summary
            .get("statusCounts")
            .and_then(|v| v.get("popular"))
            .and_then(|v| v.as_u64()),
        Some(3)
    );
    assert_eq!(
        summary
            .get("roleCounts")
            .and_then(|v| v.get("observer"))
            .and_then(|v| v.as_u64()),
        Some(4)
    );

    // Single-student view agrees with the group run.
    let student_view = request_ok(
        &mut stdin,
        &mut reader,
        "an2",
        "analysis.student",
        json!({ "groupId": group_id, "studentId": student_ids["Dot"] }),
    );
    assert_eq!(
        student_view
            .get("student")
            .and_then(|s| s.get("sociometricStatus"))
            .and_then(|v| v.as_str()),
        Some("isolated")
    );
    assert_eq!(
        student_view
            .get("student")
            .and_then(|s| s.get("bullyingRole"))
            .and_then(|v| v.as_str()),
        Some("observer")
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn group_with_students_but_no_responses_flags_low_participation() {
    let workspace = temp_dir("sociogram-analysis-empty");
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
        json!({ "name": "Quiet Group" }),
    );
    let group_id = group
        .get("groupId")
        .and_then(|v| v.as_str())
        .expect("groupId")
        .to_string();
    for i in 0..3 {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("s{}", i),
            "students.create",
            json!({
                "groupId": group_id,
                "lastName": format!("Last{}", i),
                "firstName": format!("First{}", i),
            }),
        );
    }

    let analysis = request_ok(
        &mut stdin,
        &mut reader,
        "an",
        "analysis.group",
        json!({ "groupId": group_id }),
    );
    let summary = analysis.get("summary").expect("summary");
    assert_eq!(
        summary.get("participationRate").and_then(|v| v.as_f64()),
        Some(0.0)
    );
    let warnings: Vec<&str> = summary
        .get("warnings")
        .and_then(|v| v.as_array())
        .expect("warnings")
        .iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(warnings, vec!["lowParticipation"]);
    assert_eq!(
        summary
            .get("statusCounts")
            .and_then(|v| v.get("isolated"))
            .and_then(|v| v.as_u64()),
        Some(3)
    );

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
