use log::{debug, trace};

/// Path tokens the sampler emits for traffic it could not attribute
const UNRESOLVED_PREFIXES: &[&str] = &["unknown TCP", "unknown UDP", "unknown"];

/// A partial line longer than this is discarded rather than buffered forever
const MAX_PENDING: usize = 1 << 20;

/// One rate line of the sampler's trace output
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerLine {
    /// `<program path>/<pid>/<owner>`
    pub token: String,
    pub sent: f64,
    pub received: f64,
}

/// Process identity encoded at the end of a path token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessPath {
    pub program: String,
    pub pid: u32,
    pub owner: String,
}

impl SamplerLine {
    /// Split the token into program path, pid and owner
    pub fn process_path(&self) -> Option<ProcessPath> {
        let mut parts = self.token.rsplitn(3, '/');
        let owner = parts.next()?.trim();
        let pid: u32 = parts.next()?.trim().parse().ok()?;
        let program = parts.next().unwrap_or_default();
        if pid == 0 || owner.is_empty() {
            return None;
        }
        Some(ProcessPath {
            program: program.to_string(),
            pid,
            owner: owner.to_string(),
        })
    }
}

/// Parse one complete line.
///
/// Accepts both `token\tsent\trecv` and whitespace separated output. Lines
/// with the wrong shape, unattributed traffic, or no traffic at all yield
/// `None`.
pub fn parse_line(line: &str) -> Option<SamplerLine> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (token, sent, received) = if line.contains('\t') {
        let fields: Vec<&str> = line.split('\t').map(str::trim).filter(|f| !f.is_empty()).collect();
        if fields.len() != 3 {
            return None;
        }
        (fields[0].to_string(), fields[1], fields[2])
    } else {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return None;
        }
        let (token, rates) = fields.split_at(fields.len() - 2);
        (token.join(" "), rates[0], rates[1])
    };

    let sent: f64 = sent.parse().ok()?;
    let received: f64 = received.parse().ok()?;
    if !sent.is_finite() || !received.is_finite() || sent < 0.0 || received < 0.0 {
        return None;
    }
    if sent == 0.0 && received == 0.0 {
        return None;
    }
    if UNRESOLVED_PREFIXES.iter().any(|prefix| token.starts_with(prefix)) {
        return None;
    }

    Some(SamplerLine { token, sent, received })
}

/// Incremental line splitter over the sampler's stdout.
///
/// Holds only the trailing partial line between chunks, so records split
/// across pipe reads come out exactly once.
#[derive(Debug, Default)]
pub struct TraceParser {
    pending: Vec<u8>,
}

impl TraceParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and collect every record completed by it
    pub fn feed(&mut self, chunk: impl AsRef<[u8]>) -> Vec<SamplerLine> {
        self.pending.extend_from_slice(chunk.as_ref());

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            if self.pending.len() > MAX_PENDING {
                debug!("Discarding {} bytes of unterminated sampler output", self.pending.len());
                self.pending.clear();
            }
            return Vec::new();
        };

        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        complete
            .split(|b| *b == b'\n')
            .filter_map(|raw| {
                let line = String::from_utf8_lossy(raw);
                let parsed = parse_line(&line);
                if parsed.is_none() && !line.trim().is_empty() {
                    trace!("Ignoring sampler line: {}", line.trim());
                }
                parsed
            })
            .collect()
    }

    /// Bytes held back waiting for a newline
    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
