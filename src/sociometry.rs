use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Role a questionnaire item plays in the analysis. Questions without a
/// mapped role exist (free-text items, warm-up items) and are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionRole {
    Positive,
    Negative,
    Aggressor,
    Victim,
}

impl QuestionRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "positive" => Some(QuestionRole::Positive),
            "negative" => Some(QuestionRole::Negative),
            "aggressor" => Some(QuestionRole::Aggressor),
            "victim" => Some(QuestionRole::Victim),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionRole::Positive => "positive",
            QuestionRole::Negative => "negative",
            QuestionRole::Aggressor => "aggressor",
            QuestionRole::Victim => "victim",
        }
    }

    fn slot(self) -> usize {
        match self {
            QuestionRole::Positive => 0,
            QuestionRole::Negative => 1,
            QuestionRole::Aggressor => 2,
            QuestionRole::Victim => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SociometricStatus {
    Popular,
    Rejected,
    Controversial,
    Isolated,
    Average,
}

impl SociometricStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SociometricStatus::Popular => "popular",
            SociometricStatus::Rejected => "rejected",
            SociometricStatus::Controversial => "controversial",
            SociometricStatus::Isolated => "isolated",
            SociometricStatus::Average => "average",
        }
    }

    const ALL: [SociometricStatus; 5] = [
        SociometricStatus::Popular,
        SociometricStatus::Rejected,
        SociometricStatus::Controversial,
        SociometricStatus::Isolated,
        SociometricStatus::Average,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BullyingRole {
    Aggressor,
    Victim,
    AggressorVictim,
    Observer,
}

impl BullyingRole {
    pub fn as_str(self) -> &'static str {
        match self {
            BullyingRole::Aggressor => "aggressor",
            BullyingRole::Victim => "victim",
            BullyingRole::AggressorVictim => "aggressor-victim",
            BullyingRole::Observer => "observer",
        }
    }

    const ALL: [BullyingRole; 4] = [
        BullyingRole::Aggressor,
        BullyingRole::Victim,
        BullyingRole::AggressorVictim,
        BullyingRole::Observer,
    ];
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AnalysisError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone)]
pub struct RosterStudent {
    pub id: String,
    pub display_name: String,
}

/// One submitted questionnaire answer: the submitting student names zero or
/// more peers for one question. Immutable once stored; re-submissions are
/// resolved last-write-wins by `submitted_at`.
#[derive(Debug, Clone)]
pub struct ResponseRecord {
    pub student_id: String,
    pub question_id: String,
    pub nominated: Vec<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Classification cut-offs as fractions of the theoretical nomination
/// maximum (roster size minus one). Defaults can be overridden per
/// workspace or per request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Thresholds {
    pub status_high: f64,
    pub status_low: f64,
    pub aggressor: f64,
    pub victim: f64,
    pub participation: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            status_high: 0.30,
            status_low: 0.10,
            aggressor: 0.20,
            victim: 0.15,
            participation: 0.70,
        }
    }
}

/// Apply a partial override object (e.g. request `options.thresholds` or the
/// persisted workspace setting) on top of `base`. Unknown keys are rejected
/// so a typo does not silently keep a default.
pub fn parse_threshold_overrides(
    base: Thresholds,
    raw: Option<&serde_json::Value>,
) -> Result<Thresholds, AnalysisError> {
    let Some(raw) = raw else {
        return Ok(base);
    };
    if raw.is_null() {
        return Ok(base);
    }
    let Some(obj) = raw.as_object() else {
        return Err(AnalysisError::new(
            "bad_params",
            "thresholds must be an object",
        ));
    };

    let mut out = base;
    for (key, value) in obj {
        let target = match key.as_str() {
            "statusHigh" => &mut out.status_high,
            "statusLow" => &mut out.status_low,
            "aggressor" => &mut out.aggressor,
            "victim" => &mut out.victim,
            "participation" => &mut out.participation,
            other => {
                return Err(AnalysisError::new(
                    "bad_params",
                    format!("unknown threshold key: {}", other),
                ));
            }
        };
        let Some(v) = value.as_f64() else {
            return Err(AnalysisError::new(
                "bad_params",
                format!("threshold {} must be a number", key),
            ));
        };
        if !(0.0..=1.0).contains(&v) {
            return Err(
                AnalysisError::new("bad_params", format!("threshold {} out of range", key))
                    .with_details(json!({ "value": v })),
            );
        }
        *target = v;
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAnalysis {
    pub student_id: String,
    pub display_name: String,
    pub sociometric_status: SociometricStatus,
    pub bullying_role: BullyingRole,
    pub positive_received: usize,
    pub negative_received: usize,
    pub aggressor_received: usize,
    pub victim_received: usize,
    pub positive_pct: f64,
    pub negative_pct: f64,
    pub aggressor_score: f64,
    pub victim_score: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub status_counts: BTreeMap<String, usize>,
    pub role_counts: BTreeMap<String, usize>,
    pub cohesion_index: f64,
    pub participation_rate: f64,
    pub warnings: Vec<String>,
    pub dropped_nominations: usize,
    pub duplicates_resolved: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupAnalysis {
    pub per_student: Vec<StudentAnalysis>,
    pub summary: GroupSummary,
}

pub const WARN_LOW_PARTICIPATION: &str = "lowParticipation";

fn classify_status(positive_pct: f64, negative_pct: f64, t: &Thresholds) -> SociometricStatus {
    // Checked in this order; first match wins.
    if positive_pct >= t.status_high && negative_pct <= t.status_low {
        SociometricStatus::Popular
    } else if negative_pct >= t.status_high && positive_pct <= t.status_low {
        SociometricStatus::Rejected
    } else if positive_pct >= t.status_high && negative_pct >= t.status_high {
        SociometricStatus::Controversial
    } else if positive_pct <= t.status_low && negative_pct <= t.status_low {
        SociometricStatus::Isolated
    } else {
        SociometricStatus::Average
    }
}

fn classify_role(aggressor_score: f64, victim_score: f64, t: &Thresholds) -> BullyingRole {
    // The both-met case must win over the single-role cases.
    match (aggressor_score >= t.aggressor, victim_score >= t.victim) {
        (true, true) => BullyingRole::AggressorVictim,
        (true, false) => BullyingRole::Aggressor,
        (false, true) => BullyingRole::Victim,
        (false, false) => BullyingRole::Observer,
    }
}

/// Pure analysis over one group: tally received nominations, classify every
/// roster student, and derive group aggregates. No I/O; deterministic for
/// identical inputs.
///
/// Fails only on structurally invalid input (empty roster, response with an
/// empty question reference). Missing data per student is all-zero tallies.
pub fn analyze_group(
    roster: &[RosterStudent],
    responses: &[ResponseRecord],
    question_roles: &HashMap<String, QuestionRole>,
    thresholds: &Thresholds,
) -> Result<GroupAnalysis, AnalysisError> {
    if roster.is_empty() {
        return Err(AnalysisError::new(
            "empty_roster",
            "roster must contain at least one student",
        ));
    }
    for r in responses {
        if r.question_id.trim().is_empty() {
            return Err(AnalysisError::new(
                "malformed_response",
                "response is missing its question reference",
            )
            .with_details(json!({ "studentId": r.student_id })));
        }
    }

    let index: HashMap<&str, usize> = roster
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    // Last-write-wins per (student, question). On equal timestamps the
    // later record in input order wins.
    let mut effective: HashMap<(&str, &str), &ResponseRecord> = HashMap::new();
    let mut duplicates_resolved = 0usize;
    for r in responses {
        match effective.entry((r.student_id.as_str(), r.question_id.as_str())) {
            std::collections::hash_map::Entry::Occupied(mut e) => {
                duplicates_resolved += 1;
                if r.submitted_at >= e.get().submitted_at {
                    e.insert(r);
                }
            }
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(r);
            }
        }
    }

    // counters: [positive, negative, aggressor, victim] received per student.
    let mut received = vec![[0usize; 4]; roster.len()];
    let mut dropped_nominations = 0usize;
    let mut positive_edges: HashSet<(usize, usize)> = HashSet::new();
    let mut positive_total = 0usize;

    for r in effective.values() {
        let Some(&from_idx) = index.get(r.student_id.as_str()) else {
            // Submitter is not on this roster; nothing here may count.
            dropped_nominations += r.nominated.len();
            continue;
        };
        let Some(&role) = question_roles.get(&r.question_id) else {
            continue;
        };
        for nominee in &r.nominated {
            if *nominee == r.student_id {
                continue;
            }
            let Some(&to_idx) = index.get(nominee.as_str()) else {
                dropped_nominations += 1;
                continue;
            };
            received[to_idx][role.slot()] += 1;
            if role == QuestionRole::Positive {
                positive_total += 1;
                positive_edges.insert((from_idx, to_idx));
            }
        }
    }

    let n = roster.len();
    let denom = if n > 1 { (n - 1) as f64 } else { 1.0 };

    let mut status_counts: BTreeMap<String, usize> = SociometricStatus::ALL
        .iter()
        .map(|s| (s.as_str().to_string(), 0))
        .collect();
    let mut role_counts: BTreeMap<String, usize> = BullyingRole::ALL
        .iter()
        .map(|r| (r.as_str().to_string(), 0))
        .collect();

    let mut per_student = Vec::with_capacity(n);
    for (i, s) in roster.iter().enumerate() {
        let [pos, neg, agg, vic] = received[i];
        let positive_pct = pos as f64 / denom;
        let negative_pct = neg as f64 / denom;
        let aggressor_score = agg as f64 / denom;
        let victim_score = vic as f64 / denom;

        let status = classify_status(positive_pct, negative_pct, thresholds);
        let role = classify_role(aggressor_score, victim_score, thresholds);
        *status_counts.entry(status.as_str().to_string()).or_insert(0) += 1;
        *role_counts.entry(role.as_str().to_string()).or_insert(0) += 1;

        per_student.push(StudentAnalysis {
            student_id: s.id.clone(),
            display_name: s.display_name.clone(),
            sociometric_status: status,
            bullying_role: role,
            positive_received: pos,
            negative_received: neg,
            aggressor_received: agg,
            victim_received: vic,
            positive_pct,
            negative_pct,
            aggressor_score,
            victim_score,
        });
    }

    // A reciprocated pair is counted once regardless of direction.
    let reciprocated_pairs = positive_edges
        .iter()
        .filter(|(a, b)| a < b && positive_edges.contains(&(*b, *a)))
        .count();
    let cohesion_index = if positive_total == 0 {
        0.0
    } else {
        reciprocated_pairs as f64 / positive_total as f64
    };

    let submitters: HashSet<&str> = responses
        .iter()
        .filter(|r| index.contains_key(r.student_id.as_str()))
        .map(|r| r.student_id.as_str())
        .collect();
    let participation_rate = submitters.len() as f64 / n as f64;

    let mut warnings = Vec::new();
    if participation_rate < thresholds.participation {
        warnings.push(WARN_LOW_PARTICIPATION.to_string());
    }

    Ok(GroupAnalysis {
        per_student,
        summary: GroupSummary {
            status_counts,
            role_counts,
            cohesion_index,
            participation_rate,
            warnings,
            dropped_nominations,
            duplicates_resolved,
        },
    })
}
