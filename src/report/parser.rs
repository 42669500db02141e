use regex::Regex;
use std::path::Path;
use tracing::{info, warn};

use super::{DynamicCounts, ParseOptions, ParseResult, MAX_SCORE_MAGNITUDE, STATIC_DEFAULT_SCORE};
use crate::config::{TestCategory, TestTypeDefinition};
use crate::error::StatusError;

/// Read the definition's report file and score it according to its category.
pub fn parse(
    definition: &TestTypeDefinition,
    options: ParseOptions,
) -> Result<ParseResult, StatusError> {
    info!(
        "Parsing {} report: {:?}",
        definition.test_type, definition.input_file
    );

    let content = std::fs::read_to_string(&definition.input_file).map_err(|e| {
        StatusError::ReportNotFound {
            path: definition.input_file.clone(),
            source: e,
        }
    })?;

    match definition.category {
        TestCategory::Dynamic => parse_dynamic(&definition.input_file, &definition.pattern, &content),
        TestCategory::Static => {
            let result = parse_static(&definition.input_file, &definition.pattern, &content)?;
            if let ParseResult::Static { matched: false, .. } = result {
                if options.strict_static {
                    return Err(StatusError::malformed(
                        &definition.input_file,
                        "no line matched the pattern",
                    ));
                }
                warn!(
                    "No line in {:?} matched the {} pattern; reporting default score {}",
                    definition.input_file, definition.test_type, STATIC_DEFAULT_SCORE
                );
            }
            Ok(result)
        }
    }
}

/// Score a dynamic-test summary. Only the first line is considered; the
/// pattern must capture errors, failures, skips and tests, in that order.
pub fn parse_dynamic(
    path: &Path,
    pattern: &Regex,
    content: &str,
) -> Result<ParseResult, StatusError> {
    let first_line = content
        .lines()
        .next()
        .ok_or_else(|| StatusError::malformed(path, "report is empty"))?;

    let captures = pattern
        .captures(first_line)
        .ok_or_else(|| StatusError::malformed(path, "first line does not match the pattern"))?;

    let mut values = [0u64; 4];
    for (i, value) in values.iter_mut().enumerate() {
        let token = captures.get(i + 1).ok_or_else(|| {
            StatusError::malformed(
                path,
                format!("expected 4 capture groups, group {} is missing", i + 1),
            )
        })?;
        *value = count_from_token(token.as_str())
            .ok_or_else(|| StatusError::malformed(path, format!("bad count '{}'", token.as_str())))?;
    }
    let [errors, failures, skips, tests] = values;
    let counts = DynamicCounts {
        errors,
        failures,
        skips,
        tests,
    };

    let problems = counts
        .problems()
        .ok_or_else(|| StatusError::malformed(path, "error/failure counts overflow"))?;
    let passed = problems == 0;
    let score = if problems == 0 {
        1.0
    } else if tests == 0 {
        return Err(StatusError::malformed(
            path,
            format!("{} problems reported but tests=\"0\"", problems),
        ));
    } else {
        (tests as f64 - problems as f64) / tests as f64
    };

    Ok(ParseResult::Dynamic {
        score,
        passed,
        counts,
    })
}

/// Score a static/quality-indicator report. Every line is tried and the last
/// match wins; no match leaves the default score in place.
pub fn parse_static(
    path: &Path,
    pattern: &Regex,
    content: &str,
) -> Result<ParseResult, StatusError> {
    let mut score = STATIC_DEFAULT_SCORE;
    let mut matched = false;

    for line in content.lines() {
        let Some(captures) = pattern.captures(line) else {
            continue;
        };
        let raw = captures
            .get(1)
            .ok_or_else(|| StatusError::malformed(path, "pattern has no capture group"))?
            .as_str();
        let value: f64 = raw
            .trim()
            .parse()
            .map_err(|_| StatusError::malformed(path, format!("'{}' is not a number", raw)))?;
        if !value.is_finite() || value.abs() > MAX_SCORE_MAGNITUDE {
            return Err(StatusError::malformed(
                path,
                format!("score '{}' is out of range", raw),
            ));
        }
        score = value;
        matched = true;
    }

    Ok(ParseResult::Static { score, matched })
}

/// `errors="3"` -> 3. A bare number is accepted too.
fn count_from_token(token: &str) -> Option<u64> {
    let value = token.split_once('=').map_or(token, |(_, v)| v);
    value.trim().trim_matches('"').trim().parse().ok()
}
