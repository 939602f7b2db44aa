//! The embedded `<script>` form.
//!
//! Layout, one statement per line so the payload can be parsed back without
//! a JavaScript engine:
//!
//! ```text
//! <script data-edges-state>
//! (function(){ ...helpers...
//! e("<key>","<wire json>");
//! p("<key>","<base64 wire json>");
//! })();
//! </script>
//! ```
//!
//! `e` parses and revives an entry into `window.__EDGES_STATE__`; `p` first
//! decodes base64 as UTF-8. String literals never contain `<`, `>` or `&`,
//! so no value can terminate the element or open a comment inside it.

use std::fmt::Write as _;

use super::PayloadEntry;
use super::codec::{decode, pack, unpack};
use crate::error::{Result, StateError};
use crate::value::StateValue;

/// Attribute identifying state scripts.
pub const SCRIPT_MARKER: &str = "data-edges-state";

const PRELUDE: &str = concat!(
	"(function(){var w=window,t=w.__EDGES_STATE__=w.__EDGES_STATE__||{};",
	"function u(v){if(v&&typeof v===\"object\"){if(!Array.isArray(v)){var k=Object.keys(v);",
	"if(k.length===1&&v[k[0]]===true){if(k[0]===\"__EDGES_UNDEFINED__\")return undefined;",
	"if(k[0]===\"__EDGES_NULL__\")return null;}}for(var i in v){v[i]=u(v[i]);}}return v;}",
	"function d(b){var s=atob(b),a=new Uint8Array(s.length);",
	"for(var i=0;i<s.length;i++)a[i]=s.charCodeAt(i);return new TextDecoder().decode(a);}",
	"function e(k,j){t[k]=u(JSON.parse(j));}",
	"function p(k,b){e(k,d(b));}",
);

const EPILOGUE: &str = "})();";

pub(super) fn render(entries: &[PayloadEntry]) -> String {
	let mut out = String::with_capacity(
		PRELUDE.len() + entries.iter().map(|e| e.encoded.len() + e.key.len() + 16).sum::<usize>(),
	);
	let _ = writeln!(out, "<script {SCRIPT_MARKER}>");
	out.push_str(PRELUDE);
	out.push('\n');
	for entry in entries {
		let (call, body) = if entry.packed {
			("p", pack(&entry.encoded))
		} else {
			("e", entry.encoded.clone())
		};
		let _ = writeln!(
			out,
			"{call}({},{});",
			js_string_literal(&entry.key),
			js_string_literal(&body)
		);
	}
	out.push_str(EPILOGUE);
	out.push_str("\n</script>");
	out
}

/// A JSON string literal safe to embed in an HTML script element.
fn js_string_literal(value: &str) -> String {
	let quoted = serde_json::Value::String(value.to_string()).to_string();
	let mut out = String::with_capacity(quoted.len());
	for ch in quoted.chars() {
		match ch {
			'<' => out.push_str("\\u003c"),
			'>' => out.push_str("\\u003e"),
			'&' => out.push_str("\\u0026"),
			'\u{2028}' => out.push_str("\\u2028"),
			'\u{2029}' => out.push_str("\\u2029"),
			other => out.push(other),
		}
	}
	out
}

/// Parses the entries of a state script.
///
/// Accepts the whole element or only its text. Lines that are not entry
/// statements are skipped.
///
/// # Errors
///
/// [`StateError::ParseFailure`] when any entry statement is malformed; no
/// entries are returned in that case.
pub fn parse_script_payload(text: &str) -> Result<Vec<(String, StateValue)>> {
	text.lines()
		.map(str::trim)
		.filter(|line| line.starts_with("e(") || line.starts_with("p("))
		.map(parse_statement)
		.collect()
}

fn parse_statement(line: &str) -> Result<(String, StateValue)> {
	let packed = line.starts_with('p');
	let rest = &line[2..];
	let (key, rest) = take_string_literal(rest)?;
	let rest = rest
		.strip_prefix(',')
		.ok_or_else(|| malformed("expected ',' between arguments", line))?;
	let (body, rest) = take_string_literal(rest)?;
	if rest.trim_end() != ");" {
		return Err(malformed("expected ');' after arguments", line));
	}

	let encoded = if packed { unpack(&body)? } else { body };
	Ok((key, decode(&encoded)?))
}

/// Splits a leading JSON string literal off `input` and returns it unescaped.
fn take_string_literal(input: &str) -> Result<(String, &str)> {
	if !input.starts_with('"') {
		return Err(malformed("expected a string literal", input));
	}
	let mut escaped = false;
	for (index, ch) in input.char_indices().skip(1) {
		match ch {
			_ if escaped => escaped = false,
			'\\' => escaped = true,
			'"' => {
				let literal = &input[..=index];
				let value = serde_json::from_str::<String>(literal)
					.map_err(|e| StateError::ParseFailure(e.to_string()))?;
				return Ok((value, &input[index + 1..]));
			}
			_ => {}
		}
	}
	Err(malformed("unterminated string literal", input))
}

fn malformed(reason: &str, near: &str) -> StateError {
	let excerpt: String = near.chars().take(40).collect();
	StateError::ParseFailure(format!("{reason} near `{excerpt}`"))
}

/// Inserts `script` immediately before the last `</body>` of `html`.
///
/// The tag is matched without regard to ASCII case. Documents without a
/// closing body tag get the script appended.
pub fn inject_script(html: &str, script: &str) -> String {
	let mut out = String::with_capacity(html.len() + script.len());
	match rfind_ascii_ci(html, "</body") {
		Some(index) => {
			out.push_str(&html[..index]);
			out.push_str(script);
			out.push_str(&html[index..]);
		}
		None => {
			out.push_str(html);
			out.push_str(script);
		}
	}
	out
}

/// Last byte offset of `needle` in `haystack`, ignoring ASCII case.
fn rfind_ascii_ci(haystack: &str, needle: &str) -> Option<usize> {
	let hay = haystack.as_bytes();
	let needle = needle.as_bytes();
	if needle.len() > hay.len() {
		return None;
	}
	(0..=hay.len() - needle.len())
		.rev()
		.find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}
