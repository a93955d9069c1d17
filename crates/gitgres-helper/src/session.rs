//! The remote-helper command loop.

use std::io::{BufRead, Write};

use gitgres_backend::{OdbBackend, RefdbBackend, Reference};
use gitgres_hash::ObjectId;
use gitgres_local::LocalRepository;
use tracing::{debug, warn};

use crate::{HelperError, PushSpec};

/// One helper dialogue: reads commands from `input` until a top-level
/// blank line or end-of-stream, answering on `output`.
///
/// ```text
/// IDLE --capabilities--> IDLE        (capability block)
/// IDLE --list[ for-push]--> IDLE     (ref listing)
/// IDLE --fetch ...--> fetch block    (drains lines, bulk copy, blank)
/// IDLE --push ...--> push block      (drains lines, copy + updates, results)
/// IDLE --blank/EOF--> done
/// ```
pub struct HelperSession<'a, R, W> {
    input: R,
    output: W,
    odb: &'a dyn OdbBackend,
    refdb: &'a dyn RefdbBackend,
    local: &'a LocalRepository,
}

impl<'a, R: BufRead, W: Write> HelperSession<'a, R, W> {
    pub fn new(
        input: R,
        output: W,
        odb: &'a dyn OdbBackend,
        refdb: &'a dyn RefdbBackend,
        local: &'a LocalRepository,
    ) -> Self {
        Self {
            input,
            output,
            odb,
            refdb,
            local,
        }
    }

    /// Run the loop to completion.
    pub fn run(&mut self) -> Result<(), HelperError> {
        loop {
            let Some(line) = self.read_line()? else { break };
            debug!(line = line.as_str(), "command");

            if line == "capabilities" {
                self.cmd_capabilities()?;
            } else if line == "list" || line == "list for-push" {
                self.cmd_list()?;
            } else if line.starts_with("fetch ") {
                self.cmd_fetch()?;
            } else if let Some(raw) = line.strip_prefix("push ") {
                self.cmd_push(raw)?;
            } else if line.is_empty() {
                break;
            } else {
                debug!(line = line.as_str(), "unknown command, ignoring");
            }
        }
        Ok(())
    }

    /// Next input line without its newline; `None` at end-of-stream.
    fn read_line(&mut self) -> Result<Option<String>, HelperError> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn cmd_capabilities(&mut self) -> Result<(), HelperError> {
        writeln!(self.output, "fetch")?;
        writeln!(self.output, "push")?;
        writeln!(self.output)?;
        self.output.flush()?;
        Ok(())
    }

    /// Advertise refs: every direct ref as `<hex> <name>`, then `HEAD`
    /// as `@<target> HEAD` when it is symbolic and its target resolves,
    /// or `<hex> HEAD` when it is direct.
    fn cmd_list(&mut self) -> Result<(), HelperError> {
        let refs: Vec<Reference> = self
            .refdb
            .iter(None)?
            .collect::<Result<_, _>>()?;

        let mut head_symbolic: Option<&str> = None;
        let mut head_oid: Option<ObjectId> = None;

        for reference in &refs {
            if reference.name() == "HEAD" {
                match reference {
                    Reference::Symbolic { target, .. } => head_symbolic = Some(target),
                    Reference::Direct { oid, .. } => head_oid = Some(*oid),
                }
                continue;
            }
            if let Some(oid) = reference.oid() {
                writeln!(self.output, "{} {}", oid.to_hex(), reference.name())?;
                debug!(name = reference.name(), oid = %oid, "list");
            }
        }

        if let Some(target) = head_symbolic {
            // Advertise the symbolic HEAD only when its target exists.
            let resolves = refs
                .iter()
                .any(|r| r.name() == target && r.oid().is_some());
            if resolves {
                writeln!(self.output, "@{target} HEAD")?;
                debug!(target, "list: symbolic HEAD");
            }
        } else if let Some(oid) = head_oid {
            writeln!(self.output, "{} HEAD", oid.to_hex())?;
        }

        writeln!(self.output)?;
        self.output.flush()?;
        Ok(())
    }

    /// The first `fetch` line was consumed by the main loop; drain the
    /// rest of the block, then copy every object the store has and the
    /// local repository lacks.
    fn cmd_fetch(&mut self) -> Result<(), HelperError> {
        while let Some(line) = self.read_line()? {
            if line.is_empty() {
                break;
            }
            debug!(line = line.as_str(), "fetch");
        }

        let mut copied = 0usize;
        let mut copy_err: Option<HelperError> = None;
        self.odb.foreach(&mut |oid| {
            if self.local.contains(oid) {
                return true;
            }
            match self.odb.read(oid) {
                Ok((obj_type, data)) => match self.local.write(obj_type, &data) {
                    Ok(_) => copied += 1,
                    Err(e) => {
                        copy_err = Some(e.into());
                        return false;
                    }
                },
                Err(e) => {
                    // A vanished object only degrades the fetch.
                    warn!(oid = %oid, error = %e, "could not read object");
                }
            }
            true
        })?;
        if let Some(e) = copy_err {
            return Err(e);
        }
        debug!(copied, "fetched objects");

        writeln!(self.output)?;
        self.output.flush()?;
        Ok(())
    }

    /// The first `push` refspec arrives as `raw`; drain the rest of the
    /// block, bulk-copy missing objects, then apply each refspec.
    fn cmd_push(&mut self, raw: &str) -> Result<(), HelperError> {
        let mut specs = vec![PushSpec::parse(raw)];
        while let Some(line) = self.read_line()? {
            if line.is_empty() {
                break;
            }
            if let Some(raw) = line.strip_prefix("push ") {
                specs.push(PushSpec::parse(raw));
            }
        }
        for spec in &specs {
            debug!(src = spec.src.as_str(), dst = spec.dst.as_str(), force = spec.force, "push spec");
            if !spec.dst.starts_with("refs/") && spec.dst != "HEAD" {
                warn!(dst = spec.dst.as_str(), "destination lacks a refs/ prefix; storing verbatim");
            }
        }

        // Copy every local object the store does not have yet.
        let mut copied = 0usize;
        for oid in self.local.all_oids()? {
            if self.odb.exists(&oid)? {
                continue;
            }
            match self.local.read(&oid) {
                Ok((obj_type, data)) => {
                    self.odb.write(&oid, &data, obj_type)?;
                    copied += 1;
                }
                Err(e) => warn!(oid = %oid, error = %e, "could not read local object"),
            }
        }
        debug!(copied, "copied objects to store");

        for spec in &specs {
            self.apply_push_spec(spec)?;
        }

        self.ensure_head(&specs)?;

        writeln!(self.output)?;
        self.output.flush()?;
        Ok(())
    }

    /// Apply one refspec, emitting `ok <dst>` or `error <dst> <reason>`.
    fn apply_push_spec(&mut self, spec: &PushSpec) -> Result<(), HelperError> {
        if spec.is_delete() {
            return match self.refdb.delete(&spec.dst, None, None) {
                Ok(()) => {
                    writeln!(self.output, "ok {}", spec.dst)?;
                    Ok(())
                }
                Err(e) => {
                    writeln!(self.output, "error {} {}", spec.dst, e)?;
                    Ok(())
                }
            };
        }

        // A source is a local ref name, or failing that a raw OID.
        let oid = match self.local.resolve_to_oid(&spec.src)? {
            Some(oid) => oid,
            None => match ObjectId::from_hex(&spec.src) {
                Ok(oid) => oid,
                Err(_) => {
                    writeln!(self.output, "error {} cannot resolve '{}'", spec.dst, spec.src)?;
                    return Ok(());
                }
            },
        };

        match self.refdb.write(
            &Reference::direct(&spec.dst, oid),
            true,
            None,
            None,
            None,
            None,
        ) {
            Ok(()) => {
                writeln!(self.output, "ok {}", spec.dst)?;
                debug!(dst = spec.dst.as_str(), oid = %oid, "ref updated");
            }
            Err(e) => {
                writeln!(self.output, "error {} {}", spec.dst, e)?;
            }
        }
        Ok(())
    }

    /// First push into an empty repository: point `HEAD` at the first
    /// pushed destination so clones have a default branch.
    fn ensure_head(&mut self, specs: &[PushSpec]) -> Result<(), HelperError> {
        if specs.is_empty() || self.refdb.exists("HEAD")? {
            return Ok(());
        }
        let target = &specs[0].dst;
        match self.refdb.write(
            &Reference::symbolic("HEAD", target),
            false,
            None,
            None,
            None,
            None,
        ) {
            Ok(()) => debug!(target = target.as_str(), "created HEAD"),
            // A concurrent push created it first; that is fine.
            Err(gitgres_backend::BackendError::AlreadyExists(_)) => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
