//! Security invariant tests for the nowpay workspace.
//!
//! These scan the production sources of the other crates and fail when a
//! change weakens webhook verification, secret handling or outbound HTTP.

use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn crates_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .to_path_buf()
}

/// Read all .rs source files from production crates (excluding tests and this crate).
fn production_source_files() -> Vec<(String, String)> {
    let mut files = Vec::new();

    for entry in WalkDir::new(crates_dir()).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some("rs") {
            continue;
        }

        let path_str = path.to_str().unwrap_or("");
        if path_str.contains("security-audit") {
            continue;
        }
        if path_str.contains("tests/") || path_str.contains("\\tests\\") {
            continue;
        }

        if let Ok(content) = std::fs::read_to_string(path) {
            files.push((path_str.to_string(), content));
        }
    }

    files
}

/// Drop `#[cfg(test)]` modules and comment lines (doc examples included).
/// Heuristic: everything after `#[cfg(test)]` in a file is treated as test code.
fn production_lines(content: &str) -> String {
    let mut result = Vec::new();

    for line in content.lines() {
        if line.contains("#[cfg(test)]") || line.trim().starts_with("mod tests") {
            break;
        }
        if line.trim_start().starts_with("//") {
            continue;
        }
        result.push(line);
    }

    result.join("\n")
}

fn file_ending_with<'a>(files: &'a [(String, String)], suffix: &str) -> &'a str {
    files
        .iter()
        .find(|(path, _)| path.replace('\\', "/").ends_with(suffix))
        .map(|(_, content)| content.as_str())
        .unwrap_or_else(|| panic!("{suffix} not found"))
}

#[test]
fn no_hardcoded_secrets_in_production_code() {
    // 128 hex chars is the shape of an HMAC-SHA512 signature.
    let hex_sig_re = Regex::new(r"[a-fA-F0-9]{128}").unwrap();
    let secret_literal_re =
        Regex::new(r#"(?i)(api_key|ipn_secret|password|token)\s*[:=]\s*"[^"]{8,}""#).unwrap();

    for (path, content) in &production_source_files() {
        let prod_content = production_lines(content);

        for (i, line) in prod_content.lines().enumerate() {
            assert!(
                !hex_sig_re.is_match(line) && !secret_literal_re.is_match(line),
                "Potential hardcoded secret found at {}:{}: {}",
                path,
                i + 1,
                line.trim()
            );
        }
    }
}

#[test]
fn library_code_does_not_unwrap() {
    for (path, content) in &production_source_files() {
        let normalized = path.replace('\\', "/");
        if !normalized.contains("crates/nowpay/src/") {
            continue;
        }

        let prod_content = production_lines(content);
        for (i, line) in prod_content.lines().enumerate() {
            assert!(
                !line.contains(".unwrap()") && !line.contains(".expect("),
                "unwrap/expect in library code at {}:{}: {}. Return a NowPaymentsError instead.",
                path,
                i + 1,
                line.trim()
            );
        }
    }
}

#[test]
fn http_clients_disable_redirects() {
    let builder_re = Regex::new(r"reqwest::Client::builder\(\)").unwrap();
    let redirect_re = Regex::new(r"redirect\s*\(\s*.*Policy::none\(\)").unwrap();

    for (path, content) in &production_source_files() {
        let prod_content = production_lines(content);

        for mat in builder_re.find_iter(&prod_content) {
            let search_end = (mat.end() + 500).min(prod_content.len());
            let builder_chain = &prod_content[mat.start()..search_end];

            assert!(
                redirect_re.is_match(builder_chain),
                "reqwest::Client::builder() at {} does not set redirect(Policy::none()). \
                 A redirect would replay the x-api-key and bearer headers to another host.",
                path
            );
        }
    }
}

#[test]
fn constant_time_uses_subtle_crate() {
    for (path, content) in &production_source_files() {
        let prod_content = production_lines(content);

        if prod_content.contains("fn constant_time_eq") {
            assert!(
                prod_content.contains("subtle::") || prod_content.contains("use subtle"),
                "File {} contains constant_time_eq that doesn't use the subtle crate.",
                path
            );
        }
    }
}

#[test]
fn signatures_are_never_compared_with_eq() {
    let eq_re = Regex::new(r"\b(signature|sig|expected|supplied|token)\b\s*[!=]=").unwrap();

    for (path, content) in &production_source_files() {
        let prod_content = production_lines(content);

        for (i, line) in prod_content.lines().enumerate() {
            assert!(
                !eq_re.is_match(line),
                "Secret-dependent comparison with == at {}:{}: {}. Use security::constant_time_eq.",
                path,
                i + 1,
                line.trim()
            );
        }
    }
}

#[test]
fn raw_mode_hashes_body_before_parsing() {
    let files = production_source_files();
    let ipn = production_lines(file_ending_with(&files, "nowpay/src/ipn.rs"));

    let verify_start = ipn
        .find("pub fn verify(&self")
        .expect("IpnVerifier::verify not found");
    let verify = &ipn[verify_start..];
    let arm_start = verify
        .find("SignatureMode::RawBody =>")
        .expect("raw-body verification arm not found");
    let arm = &verify[arm_start..];
    let arm_end = arm.find("SignatureMode::Canonical =>").unwrap_or(arm.len());
    let arm = &arm[..arm_end];

    let hmac_at = arm.find("compute_hmac").expect("raw-body arm must compute the HMAC");
    assert!(
        !arm[..hmac_at].contains("from_slice") && !arm[..hmac_at].contains("parse_payload"),
        "raw-body verification parses the body before computing the HMAC"
    );
    assert!(
        arm[hmac_at..].contains("raw_body"),
        "raw-body verification must hash the received bytes"
    );
}

#[test]
fn error_responses_do_not_leak_internals() {
    let dangerous_patterns = [
        "expected signature",
        "ipn_secret",
        "api_key",
        "stack trace",
        "RUST_BACKTRACE",
    ];

    for (path, content) in &production_source_files() {
        if !content.contains("HttpResponse::") {
            continue;
        }

        let prod_content = production_lines(content);
        for (i, line) in prod_content.lines().enumerate() {
            for pattern in &dangerous_patterns {
                if line.contains(pattern) && line.contains("json") {
                    panic!(
                        "Potentially sensitive detail '{}' found in HTTP response at {}:{}. \
                         Internal details should be logged server-side only.",
                        pattern,
                        path,
                        i + 1
                    );
                }
            }
        }
    }
}

#[test]
fn ipn_verifier_is_mandatory() {
    let files = production_source_files();
    let state = production_lines(file_ending_with(&files, "nowpay-ipn-server/src/state.rs"));

    assert!(
        !state.contains("Option<IpnVerifier>") && state.contains("verifier: IpnVerifier"),
        "IPN server state must always carry a verifier; an optional one would accept unsigned callbacks"
    );
}

#[test]
fn secrets_have_redacted_debug() {
    let files = production_source_files();

    for suffix in [
        "nowpay/src/ipn.rs",
        "nowpay/src/client.rs",
        "nowpay/src/config.rs",
        "nowpay-ipn-server/src/config.rs",
    ] {
        let content = production_lines(file_ending_with(&files, suffix));
        assert!(
            content.contains("[REDACTED]"),
            "{suffix} holds secrets but has no redacted Debug impl"
        );
    }
}
