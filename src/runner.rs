use std::time::Duration;

use reqwest::Client;
use reqwest::Response;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use reqwest::header::CONTENT_TYPE;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderValue;
use serde_json::Value;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::asserter;
use crate::asserter::Outcome;
use crate::outputter::OutPutter;
use crate::session;
use crate::session::Session;
use crate::validator;
use crate::validator::Assertion;
use crate::validator::ValidatedCase;

pub struct Runner {
    client: Client,
    global_headers: HeaderMap,
}

/// Everything the outputter needs to know about one executed case.
#[derive(Debug)]
pub struct CaseReport {
    pub name: String,
    pub url: String,
    pub outcome: Outcome,
    pub response: Option<CapturedResponse>,
    pub captured: Vec<(String, Value)>,
    pub token_captured: Option<String>,
}

impl CaseReport {
    fn new(case: &ValidatedCase, url: String, outcome: Outcome) -> Self {
        Self {
            name: case.name.clone(),
            url,
            outcome,
            response: None,
            captured: vec![],
            token_captured: None,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome.passed()
    }
}

impl Runner {
    pub fn new(timeout: Duration, global_headers: HeaderMap) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            global_headers,
        })
    }

    /// Runs every case in declared order. Later cases see the session state
    /// left behind by earlier ones.
    pub async fn run_suite(
        &self,
        cases: &[ValidatedCase],
        session: &mut Session,
        out: &mut OutPutter,
    ) {
        for (i, case) in cases.iter().enumerate() {
            let report = self.execute(case, session).await;
            out.case(i + 1, &report);
        }
    }

    /// Executes a single case. Never fails: skips, transport errors and
    /// mismatches all end up in the returned report.
    pub async fn execute(&self, case: &ValidatedCase, session: &mut Session) -> CaseReport {
        session.tests_run += 1;

        let missing = session.missing(&case.requires);
        if !missing.is_empty() {
            debug!(case = %case.name, ?missing, "skipping case with unmet requirements");
            return CaseReport::new(case, case.endpoint.clone(), Outcome::Skipped(missing));
        }

        let held_token = case.without_token.then(|| session.token.take());
        let mut report = self.dispatch(case, session).await;
        if let Some(token) = held_token {
            session.token = token;
        }

        if report.passed() {
            session.tests_passed += 1;
            apply_captures(case, session, &mut report);
        }

        report
    }

    async fn dispatch(&self, case: &ValidatedCase, session: &Session) -> CaseReport {
        let endpoint = match session.render_endpoint(&case.endpoint) {
            Ok(endpoint) => endpoint,
            Err(e) => {
                return CaseReport::new(
                    case,
                    case.endpoint.clone(),
                    Outcome::RequestFailed(e.to_string()),
                );
            }
        };

        let url = match validator::join_url(session.base_url(), &endpoint) {
            Ok(url) => url,
            Err(e) => {
                let text = format!("{}/{}", session.base_url(), endpoint);
                return CaseReport::new(case, text, Outcome::RequestFailed(e.to_string()));
            }
        };

        let rendered = render_body(case, session)
            .and_then(|body| render_assertions(&case.assertions, session).map(|a| (body, a)));
        let (body, assertions) = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                let outcome = Outcome::RequestFailed(e.to_string());
                return CaseReport::new(case, url.to_string(), outcome);
            }
        };

        let headers = self.build_headers(case, session.token.as_deref());
        debug!(
            case = %case.name,
            method = %case.method,
            %url,
            bearer = headers.contains_key(AUTHORIZATION),
            "dispatching request"
        );

        let request = self
            .client
            .request(case.method.clone(), url.clone())
            .headers(headers);
        let request = match &body {
            Some(body) => request.json(body),
            None => request,
        };

        let received = match request.send().await {
            Ok(resp) => CapturedResponse::from_response(resp).await,
            Err(err) => Err(err),
        };

        let (outcome, response) = match received {
            Ok(response) => {
                debug!(
                    case = %case.name,
                    status = %response.status,
                    content_type = ?response.headers.get(CONTENT_TYPE),
                    json = response.is_json(),
                    "response received"
                );

                let results = asserter::check(&assertions, &response);
                (Outcome::Completed(results), Some(response))
            }
            Err(err) => {
                warn!(case = %case.name, error = %err, "request failed");
                (Outcome::RequestFailed(describe_error(&err)), None)
            }
        };

        let mut report = CaseReport::new(case, url.to_string(), outcome);
        report.response = response;
        report
    }

    /// Content type, then global headers, then either the case's own headers
    /// or the bearer token. A case header table, even an empty one, replaces
    /// the token.
    fn build_headers(&self, case: &ValidatedCase, token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        for (key, value) in &self.global_headers {
            headers.insert(key.clone(), value.clone());
        }

        match &case.headers {
            Some(overrides) => {
                for (key, value) in overrides {
                    headers.insert(key.clone(), value.clone());
                }
            }
            None => {
                if let Some(token) = token {
                    match HeaderValue::from_str(&format!("Bearer {token}")) {
                        Ok(mut value) => {
                            value.set_sensitive(true);
                            headers.insert(AUTHORIZATION, value);
                        }
                        Err(e) => warn!(error = %e, "held token is not a valid header value"),
                    }
                }
            }
        }

        headers
    }
}

fn render_body(
    case: &ValidatedCase,
    session: &Session,
) -> Result<Option<Value>, session::RenderError> {
    case.body
        .as_ref()
        .map(|body| session.render_value(body))
        .transpose()
}

fn render_assertions(
    assertions: &[Assertion],
    session: &Session,
) -> Result<Vec<Assertion>, session::RenderError> {
    assertions
        .iter()
        .map(|a| match a {
            Assertion::Status(_) => Ok(a.clone()),
            Assertion::Field { path, expected } => Ok(Assertion::Field {
                path: path.clone(),
                expected: session.render_value(expected)?,
            }),
        })
        .collect()
}

/// Copies the configured fields of a passing response into the session. A
/// missing field is logged and left out, so dependent cases skip later.
fn apply_captures(case: &ValidatedCase, session: &mut Session, report: &mut CaseReport) {
    if case.capture_token.is_none() && case.captures.is_empty() {
        return;
    }

    let Some(body) = report.response.as_ref().and_then(|r| r.body_json.clone()) else {
        warn!(case = %case.name, "response body is not JSON, nothing captured");
        return;
    };

    if let Some(path) = &case.capture_token {
        match session::lookup_path(&body, path) {
            Some(Value::String(token)) if !token.is_empty() => {
                info!(case = %case.name, "bearer token captured");
                session.token = Some(token.clone());
                report.token_captured = Some(token.clone());
            }
            Some(_) => warn!(case = %case.name, %path, "token field is not a non-empty string"),
            None => warn!(case = %case.name, %path, "token field missing from response"),
        }
    }

    for capture in &case.captures {
        match session::lookup_path(&body, &capture.path) {
            Some(value) => {
                info!(case = %case.name, name = %capture.name, %value, "value captured");
                session.capture(capture.name.clone(), value.clone());
                report.captured.push((capture.name.clone(), value.clone()));
            }
            None => warn!(
                case = %case.name,
                name = %capture.name,
                path = %capture.path,
                "captured field missing from response"
            ),
        }
    }
}

fn describe_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {err}")
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        err.to_string()
    }
}

#[derive(Debug)]
pub struct CapturedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body_text: String,
    pub body_json: Option<Value>,
}

impl CapturedResponse {
    /// Reads the whole body. A body that cannot be read to the end is a
    /// transport failure, not a response.
    pub async fn from_response(resp: Response) -> Result<Self, reqwest::Error> {
        let status = resp.status();
        let headers = resp.headers().clone();

        // Consume the body exactly once
        let body_text = resp.text().await?;
        let body_json = serde_json::from_str::<Value>(&body_text).ok();

        Ok(Self {
            status,
            headers,
            body_text,
            body_json,
        })
    }

    pub fn is_json(&self) -> bool {
        self.body_json.is_some()
    }

    /// The parsed body, or an empty object when the body was not JSON.
    pub fn body(&self) -> Value {
        self.body_json
            .clone()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()))
    }
}
