//! Incremental extraction of the side-channel object from a byte stream.
//!
//! Streamed navigation responses arrive in arbitrary chunks. The scanner
//! looks for the quoted field name followed by `:` and `{`, then captures
//! bytes until the matching `}`, ignoring braces inside JSON strings. The
//! field name, the separator and the object itself may all be split across
//! chunk boundaries.

use edges_state::SIDE_CHANNEL_FIELD;

use crate::error::{ClientError, Result};

/// Default cap on a captured side channel.
pub const DEFAULT_SCAN_LIMIT: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
	Seeking { matched: usize },
	AfterName,
	AfterColon,
	Capturing { depth: usize, in_string: bool, escaped: bool },
}

/// What one chunk yielded.
#[derive(Debug, Default)]
pub struct Scanned {
	/// Objects completed by the chunk, in stream order
	pub objects: Vec<Vec<u8>>,
	/// Set when an object in the chunk outgrew the limit and was dropped
	pub overflow: Option<ClientError>,
}

/// Finds every side-channel object in a chunked JSON stream.
#[derive(Debug, Clone)]
pub struct SideChannelScanner {
	pattern: Vec<u8>,
	phase: Phase,
	buffer: Vec<u8>,
	limit: usize,
}

impl Default for SideChannelScanner {
	fn default() -> Self {
		Self::new()
	}
}

impl SideChannelScanner {
	/// Scanner with [`DEFAULT_SCAN_LIMIT`].
	pub fn new() -> Self {
		Self::with_limit(DEFAULT_SCAN_LIMIT)
	}

	/// Scanner that gives up on objects larger than `limit` bytes.
	pub fn with_limit(limit: usize) -> Self {
		Self {
			pattern: format!("\"{SIDE_CHANNEL_FIELD}\"").into_bytes(),
			phase: Phase::Seeking { matched: 0 },
			buffer: Vec::new(),
			limit,
		}
	}

	/// True while an object is partially captured.
	pub fn is_capturing(&self) -> bool {
		matches!(self.phase, Phase::Capturing { .. })
	}

	/// Feeds one chunk and returns every object completed by it.
	///
	/// An oversized object is abandoned and reported as
	/// [`ClientError::SideChannelTooLarge`] in [`Scanned::overflow`].
	/// Objects completed before or after it in the same chunk are still
	/// returned.
	pub fn feed(&mut self, chunk: &[u8]) -> Scanned {
		let mut scanned = Scanned::default();
		for &byte in chunk {
			match self.step(byte) {
				Ok(Some(object)) => scanned.objects.push(object),
				Ok(None) => {}
				Err(error) => scanned.overflow = Some(error),
			}
		}
		scanned
	}

	fn step(&mut self, byte: u8) -> Result<Option<Vec<u8>>> {
		match self.phase {
			Phase::Seeking { matched } => self.seek(matched, byte),
			Phase::AfterName => {
				if byte == b':' {
					self.phase = Phase::AfterColon;
				} else if !byte.is_ascii_whitespace() {
					self.seek(0, byte);
				}
			}
			Phase::AfterColon => {
				if byte == b'{' {
					self.buffer.clear();
					self.buffer.push(byte);
					self.phase = Phase::Capturing {
						depth: 1,
						in_string: false,
						escaped: false,
					};
				} else if !byte.is_ascii_whitespace() {
					self.seek(0, byte);
				}
			}
			Phase::Capturing {
				depth,
				in_string,
				escaped,
			} => return self.capture(depth, in_string, escaped, byte),
		}
		Ok(None)
	}

	fn seek(&mut self, matched: usize, byte: u8) {
		let matched = if byte == self.pattern[matched] {
			matched + 1
		} else if byte == self.pattern[0] {
			1
		} else {
			0
		};
		self.phase = if matched == self.pattern.len() {
			Phase::AfterName
		} else {
			Phase::Seeking { matched }
		};
	}

	fn capture(
		&mut self,
		mut depth: usize,
		mut in_string: bool,
		mut escaped: bool,
		byte: u8,
	) -> Result<Option<Vec<u8>>> {
		self.buffer.push(byte);
		if self.buffer.len() > self.limit {
			self.buffer = Vec::new();
			self.phase = Phase::Seeking { matched: 0 };
			return Err(ClientError::SideChannelTooLarge { limit: self.limit });
		}

		if in_string {
			if escaped {
				escaped = false;
			} else if byte == b'\\' {
				escaped = true;
			} else if byte == b'"' {
				in_string = false;
			}
		} else {
			match byte {
				b'"' => in_string = true,
				b'{' => depth += 1,
				b'}' => depth -= 1,
				_ => {}
			}
		}

		if depth == 0 {
			self.phase = Phase::Seeking { matched: 0 };
			return Ok(Some(std::mem::take(&mut self.buffer)));
		}
		self.phase = Phase::Capturing {
			depth,
			in_string,
			escaped,
		};
		Ok(None)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	const BODY: &str = r#"{"type":"data","nodes":[{"label":"{not a brace}"}],"__edges_state__":{"a::state::0":"\"x}\\\"{\"","b::state::0":"{\"n\":1}"}}"#;
	const CHANNEL: &str = r#"{"a::state::0":"\"x}\\\"{\"","b::state::0":"{\"n\":1}"}"#;

	#[rstest]
	#[case(BODY.len())]
	#[case(1)]
	#[case(3)]
	#[case(17)]
	fn test_finds_channel_across_chunk_sizes(#[case] size: usize) {
		// Arrange
		let mut scanner = SideChannelScanner::new();
		let mut found = Vec::new();

		// Act
		for chunk in BODY.as_bytes().chunks(size) {
			found.extend(scanner.feed(chunk).objects);
		}

		// Assert
		assert_eq!(found, vec![CHANNEL.as_bytes().to_vec()]);
		assert!(!scanner.is_capturing());
	}

	#[rstest]
	fn test_whitespace_around_separator() {
		let mut scanner = SideChannelScanner::new();

		let found = scanner.feed(br#"{"__edges_state__" :	{ "k" : "1" } }"#).objects;

		assert_eq!(found, vec![br#"{ "k" : "1" }"#.to_vec()]);
	}

	#[rstest]
	fn test_field_name_as_value_is_ignored() {
		let mut scanner = SideChannelScanner::new();

		let found = scanner.feed(br#"{"note":"__edges_state__","x":{"y":1}}"#).objects;

		assert!(found.is_empty());
	}

	#[rstest]
	fn test_escaped_field_name_inside_string_is_ignored() {
		let mut scanner = SideChannelScanner::new();

		let found = scanner
			.feed(br#"{"note":"\"__edges_state__\":{}","x":1}"#)
			.objects;

		assert!(found.is_empty());
	}

	#[rstest]
	fn test_multiple_channels_in_one_stream() {
		let mut scanner = SideChannelScanner::new();

		let found = scanner
			.feed(b"{\"__edges_state__\":{\"a\":\"1\"}}\n{\"__edges_state__\":{\"b\":\"2\"}}\n")
			.objects;

		assert_eq!(found.len(), 2);
		assert_eq!(found[1], br#"{"b":"2"}"#.to_vec());
	}

	#[rstest]
	fn test_oversized_channel_is_abandoned() {
		// Arrange
		let mut scanner = SideChannelScanner::with_limit(8);

		// Act
		let scanned = scanner.feed(br#"{"__edges_state__":{"key":"long value"}}"#);

		// Assert
		assert!(matches!(
			scanned.overflow,
			Some(ClientError::SideChannelTooLarge { limit: 8 })
		));
		assert!(scanned.objects.is_empty());
		assert!(!scanner.is_capturing());
	}

	#[rstest]
	fn test_objects_before_an_overflow_are_kept() {
		// Arrange
		let mut scanner = SideChannelScanner::with_limit(12);
		let chunk = b"{\"__edges_state__\":{\"a\":\"1\"}}\n{\"__edges_state__\":{\"b\":\"far too long\"}}\n{\"__edges_state__\":{\"c\":\"3\"}}";

		// Act
		let scanned = scanner.feed(chunk);

		// Assert
		assert!(scanned.overflow.is_some());
		assert_eq!(
			scanned.objects,
			vec![br#"{"a":"1"}"#.to_vec(), br#"{"c":"3"}"#.to_vec()]
		);
	}
}
