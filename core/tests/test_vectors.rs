//! Verify build/parse pairs against JSON test vectors stored in `test-vectors/`.
//!
//! Each case names an operation, its inputs, the exact request descriptor
//! it must build, a simulated response, and either the expected parse
//! result (as the JSON rendering of the decoded tree) or the expected error.

use serde_json::Value;
use tracker_core::{
    Exchange, FieldValue, Fields, HttpMethod, HttpRequest, HttpResponse, IterationGroup, ListQuery,
    TrackerClient, TrackerConfig, TrackerError,
};

const TOKEN: &str = "ABC123";

fn client() -> TrackerClient {
    TrackerClient::new(TrackerConfig::default())
}

fn parse_method(s: &str) -> HttpMethod {
    match s {
        "GET" => HttpMethod::Get,
        "POST" => HttpMethod::Post,
        "PUT" => HttpMethod::Put,
        "DELETE" => HttpMethod::Delete,
        other => panic!("unknown method: {other}"),
    }
}

fn parse_group(s: &str) -> IterationGroup {
    match s {
        "current" => IterationGroup::Current,
        "backlog" => IterationGroup::Backlog,
        "done" => IterationGroup::Done,
        "current_backlog" => IterationGroup::CurrentBacklog,
        other => panic!("unknown iteration group: {other}"),
    }
}

fn query(input: &Value) -> ListQuery {
    let q = &input["query"];
    let mut query = ListQuery::new();
    if let Some(filter) = q["filter"].as_str() {
        query = query.filter(filter);
    }
    if let Some(offset) = q["offset"].as_u64() {
        query = query.offset(offset as u32);
    }
    if let Some(limit) = q["limit"].as_u64() {
        query = query.limit(limit as u32);
    }
    query
}

fn fields(input: &Value) -> Fields {
    input["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|pair| {
            let name = pair[0].as_str().unwrap().to_string();
            let value = match &pair[1] {
                Value::String(s) => FieldValue::from(s.as_str()),
                Value::Number(n) => FieldValue::from(n.as_i64().unwrap()),
                Value::Bool(b) => FieldValue::from(*b),
                other => panic!("unsupported field value: {other}"),
            };
            (name, value)
        })
        .collect()
}

fn id(input: &Value, key: &str) -> u64 {
    input[key].as_u64().unwrap()
}

fn build(c: &TrackerClient, operation: &str, input: &Value) -> HttpRequest {
    match operation {
        "authenticate" => c.build_authenticate(
            input["username"].as_str().unwrap(),
            input["password"].as_str().unwrap(),
        ),
        "all_projects" => c.build_all_projects(&query(input), TOKEN),
        "add_project" => c.build_add_project(input["name"].as_str().unwrap(), TOKEN).unwrap(),
        "all_memberships" => c.build_all_memberships(id(input, "project_id"), &query(input), TOKEN),
        "all_iterations" => c.build_all_iterations(id(input, "project_id"), &query(input), TOKEN),
        "stories_by_iteration" => c.build_stories_by_iteration(
            id(input, "project_id"),
            parse_group(input["group"].as_str().unwrap()),
            &query(input),
            TOKEN,
        ),
        "stories_by_filter" => c.build_stories_by_filter(id(input, "project_id"), &query(input), TOKEN),
        "add_story" => c
            .build_add_story(id(input, "project_id"), &fields(input), TOKEN)
            .unwrap(),
        "update_story" => c
            .build_update_story(id(input, "project_id"), id(input, "story_id"), &fields(input), TOKEN)
            .unwrap(),
        "delete_story" => c.build_delete_story(id(input, "project_id"), id(input, "story_id"), TOKEN),
        other => panic!("unknown operation: {other}"),
    }
}

/// Run the response through an exchange and the operation's parser, and
/// render whatever it returns as JSON.
fn parse(c: &TrackerClient, operation: &str, req: HttpRequest, response: HttpResponse) -> Result<Value, TrackerError> {
    let document = Exchange::complete(req, response)?;
    let value = match operation {
        "authenticate" => Value::String(c.parse_authenticate(document)?),
        "all_projects" => serde_json::to_value(c.parse_all_projects(document)?).unwrap(),
        "add_project" => serde_json::to_value(c.parse_add_project(document)?).unwrap(),
        "all_memberships" => serde_json::to_value(c.parse_all_memberships(document)?).unwrap(),
        "all_iterations" => serde_json::to_value(c.parse_all_iterations(document)?).unwrap(),
        "stories_by_iteration" => serde_json::to_value(c.parse_stories_by_iteration(document)?).unwrap(),
        "stories_by_filter" => serde_json::to_value(c.parse_stories_by_filter(document)?).unwrap(),
        "add_story" | "update_story" | "delete_story" => serde_json::to_value(c.parse_story(document)?).unwrap(),
        other => panic!("unknown operation: {other}"),
    };
    Ok(value)
}

fn run_vectors(raw: &str) {
    let vectors: Value = serde_json::from_str(raw).unwrap();
    let c = client();

    for case in vectors["cases"].as_array().unwrap() {
        let name = case["name"].as_str().unwrap();
        let operation = case["operation"].as_str().unwrap();
        let expected_req = &case["expected_request"];

        // Verify build
        let req = build(&c, operation, &case["input"]);
        assert_eq!(req.method, parse_method(expected_req["method"].as_str().unwrap()), "{name}: method");
        assert_eq!(req.path, expected_req["path"].as_str().unwrap(), "{name}: path");

        let expected_headers: Vec<(String, String)> = expected_req["headers"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| (h[0].as_str().unwrap().to_string(), h[1].as_str().unwrap().to_string()))
            .collect();
        assert_eq!(req.headers, expected_headers, "{name}: headers");
        assert_eq!(req.body.as_deref(), expected_req["body"].as_str(), "{name}: body");

        // Verify parse
        let sim = &case["simulated_response"];
        let response = HttpResponse {
            status: sim["status"].as_u64().unwrap() as u16,
            headers: Vec::new(),
            body: sim["body"].as_str().unwrap().as_bytes().to_vec(),
        };
        let outcome = parse(&c, operation, req, response);

        if let Some(expected) = case.get("expected_result") {
            assert_eq!(&outcome.unwrap(), expected, "{name}: parsed result");
        } else if let Some(message) = case["expected_error"].as_str() {
            assert_eq!(outcome.unwrap_err().to_string(), message, "{name}: error");
        } else {
            assert_eq!(case["expected_error_kind"], "decode", "{name}: vector shape");
            assert!(matches!(outcome, Err(TrackerError::Decode(_))), "{name}: {outcome:?}");
        }
    }
}

#[test]
fn token_vectors() {
    run_vectors(include_str!("../../test-vectors/tokens.json"));
}

#[test]
fn project_vectors() {
    run_vectors(include_str!("../../test-vectors/projects.json"));
}

#[test]
fn story_vectors() {
    run_vectors(include_str!("../../test-vectors/stories.json"));
}

#[test]
fn iteration_vectors() {
    run_vectors(include_str!("../../test-vectors/iterations.json"));
}
