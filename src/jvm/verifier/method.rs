use super::interpreter::{Environment, Flow};
use super::{Frame, VerificationType};
use crate::jvm::class_file::ExceptionHandler;
use crate::jvm::code::opcodes::{JSR, JSR_W};
use crate::jvm::code::{BytecodeReader, Disassembler, Instruction};
use crate::jvm::{
    BinaryName, Error, MethodDescriptor, RefType, Symbol, SymbolResolver, UnqualifiedName,
    VerifierErrorKind, VerifyError,
};
use crate::util::Width;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Method body to verify, along with what the verifier needs to know about the method
pub struct MethodBody<'a> {
    /// Class declaring the method
    pub class: &'a BinaryName,
    pub is_static: bool,
    pub name: &'a UnqualifiedName,
    pub descriptor: &'a MethodDescriptor,
    pub code: &'a [u8],
    pub exception_table: &'a [ExceptionHandler],

    /// Label names by offset, used in the listing attached to errors
    pub labels: Option<&'a BTreeMap<usize, String>>,
}

/// Limits computed for a method body which passed verification
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VerifiedCode {
    pub max_stack: u16,
    pub max_locals: u16,
}

/// Point from which the verifier replays code
struct Context {
    pc: usize,
    frame: Frame,
}

/// Abstract interpreter for a single method body
///
/// Starting from the method entry and every exception handler, code is replayed linearly while
/// tracking the types on the stack and in the locals. Every branch target gets the state from
/// the first branch to it recorded, and any later branch to the same target must arrive with a
/// compatible state (see [`Frame::is_compatible`]). Targets are queued the first time they are
/// seen, so each is replayed at most once.
///
/// Verification fails if any instruction is ill-typed, if two states at a target disagree, or if
/// some byte of the code is never reached.
pub struct Verifier<'a> {
    method: &'a MethodBody<'a>,
    symbols: &'a dyn SymbolResolver,

    /// Instructions, keyed by their offset
    instructions: BTreeMap<usize, Instruction>,

    /// Offsets at which several paths can meet
    merge_points: HashSet<usize>,

    /// State recorded the first time each merge point was reached
    recorded: HashMap<usize, Frame>,

    worklist: Vec<Context>,
    covered: Vec<bool>,
    max_stack: usize,
    max_locals: usize,
}

impl<'a> Verifier<'a> {
    /// Verify a method body, computing its maximum stack depth and number of locals
    ///
    /// On failure, the full listing of the method is logged and attached to the error.
    pub fn verify(
        method: &'a MethodBody<'a>,
        symbols: &'a dyn SymbolResolver,
    ) -> Result<VerifiedCode, Error> {
        let instructions = BytecodeReader::new(method.code)
            .map(|insn| insn.map(|insn| (insn.pc, insn)))
            .collect::<Result<BTreeMap<_, _>, Error>>()?;

        let mut verifier = Verifier {
            method,
            symbols,
            instructions,
            merge_points: HashSet::new(),
            recorded: HashMap::new(),
            worklist: vec![],
            covered: vec![false; method.code.len()],
            max_stack: 0,
            max_locals: 0,
        };
        verifier.run().map_err(|(pc, kind)| {
            let listing = verifier.listing(pc);
            log::error!(
                "verification of {}.{} failed: {}\n{}",
                method.class,
                method.name,
                kind,
                listing
            );
            Error::Verification(VerifyError { pc, kind, listing })
        })
    }

    fn listing(&self, pc: Option<usize>) -> String {
        let disassembler = Disassembler::new(self.method.code).with_symbols(self.symbols);
        let disassembler = match self.method.labels {
            Some(labels) => disassembler.with_labels(labels.clone()),
            None => disassembler.with_synthetic_labels(),
        };
        disassembler.highlight(pc).to_string()
    }

    fn run(&mut self) -> Result<VerifiedCode, (Option<usize>, VerifierErrorKind)> {
        if self.method.code.is_empty() {
            return Err((None, VerifierErrorKind::FallsOffEnd));
        }
        self.find_merge_points();

        // Seed with the method entry and exception handlers
        let entry = self.entry_frame();
        self.max_locals = entry.locals.len();
        self.branch(0, &entry).map_err(|kind| (None, kind))?;
        for handler in self.method.exception_table {
            let start = handler.start_pc.0 as usize;
            let end = handler.end_pc.0 as usize;
            let handler_pc = handler.handler_pc.0 as usize;
            let is_boundary = |pc: usize| self.instructions.contains_key(&pc);
            if start >= end
                || end > self.method.code.len()
                || !is_boundary(start)
                || !(end == self.method.code.len() || is_boundary(end))
                || !is_boundary(handler_pc)
            {
                let kind = VerifierErrorKind::BadExceptionRange {
                    start,
                    end,
                    handler: handler_pc,
                };
                return Err((Some(handler_pc), kind));
            }

            let catch_type = match handler.catch_type {
                None => RefType::THROWABLE,
                Some(index) => match self.symbols.resolve(index.index()) {
                    Ok(Symbol::Class(class)) => class,
                    Ok(other) => {
                        let kind = VerifierErrorKind::UnresolvedSymbol(format!(
                            "catch type {} is not a class",
                            other
                        ));
                        return Err((Some(handler_pc), kind));
                    }
                    Err(err) => {
                        let kind = VerifierErrorKind::UnresolvedSymbol(err.to_string());
                        return Err((Some(handler_pc), kind));
                    }
                },
            };
            let mut frame = Frame {
                locals: entry.locals.clone(),
                ..Frame::default()
            };
            frame.push(VerificationType::Object(catch_type));
            self.branch(handler_pc as i64, &frame)
                .map_err(|kind| (Some(handler_pc), kind))?;
        }

        while let Some(Context { pc, frame }) = self.worklist.pop() {
            log::debug!("replaying from {} ({} queued)", pc, self.worklist.len());
            self.replay(pc, frame)?;
        }

        self.check_coverage()?;

        let limit = |slots: usize| {
            u16::try_from(slots).map_err(|_| (None, VerifierErrorKind::LimitExceeded(slots)))
        };
        Ok(VerifiedCode {
            max_stack: limit(self.max_stack)?,
            max_locals: limit(self.max_locals)?,
        })
    }

    /// Offsets reachable other than by falling through
    fn find_merge_points(&mut self) {
        let mut merge_points = HashSet::new();
        for insn in self.instructions.values() {
            for target in insn.jump_targets() {
                if let Ok(target) = usize::try_from(target) {
                    merge_points.insert(target);
                }
            }
            if insn.opcode == JSR || insn.opcode == JSR_W {
                merge_points.insert(insn.next_pc);
            }
        }
        for handler in self.method.exception_table {
            merge_points.insert(handler.handler_pc.0 as usize);
        }
        merge_points.insert(0);
        self.merge_points = merge_points;
    }

    /// State on entry to the method: `this` (unless static) followed by the parameters
    fn entry_frame(&self) -> Frame {
        let mut frame = Frame::default();
        let mut next_local: u16 = 0;
        if !self.method.is_static {
            let this = if self.method.name == &UnqualifiedName::INIT {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(RefType::Object(self.method.class.clone()))
            };
            frame.set_local(next_local, this);
            next_local += 1;
        }
        for parameter in &self.method.descriptor.parameters {
            let parameter = VerificationType::from(parameter);
            let width = parameter.width() as u16;
            frame.set_local(next_local, parameter);
            next_local += width;
        }
        frame
    }

    /// Register an edge to `target`, queueing it if this is the first visit
    fn branch(&mut self, target: i64, frame: &Frame) -> Result<(), VerifierErrorKind> {
        let target_pc = match usize::try_from(target) {
            Ok(pc) if pc < self.method.code.len() => pc,
            _ => return Err(VerifierErrorKind::BranchOutOfRange(target)),
        };
        if !self.instructions.contains_key(&target_pc) {
            return Err(VerifierErrorKind::BranchIntoInstruction(target_pc));
        }

        match self.recorded.get(&target_pc) {
            Some(recorded) if recorded.is_compatible(frame) => Ok(()),
            Some(recorded) => Err(VerifierErrorKind::IncompatibleFrames {
                target: target_pc,
                recorded: recorded.to_string(),
                found: frame.to_string(),
            }),
            None => {
                log::debug!("queueing {} with {}", target_pc, frame);
                self.max_stack = self.max_stack.max(frame.stack_slots());
                self.recorded.insert(target_pc, frame.clone());
                self.worklist.push(Context {
                    pc: target_pc,
                    frame: frame.clone(),
                });
                Ok(())
            }
        }
    }

    /// Replay code linearly from `pc` until control leaves the straight-line run
    fn replay(&mut self, mut pc: usize, mut frame: Frame) -> Result<(), (Option<usize>, VerifierErrorKind)> {
        let env = Environment {
            symbols: self.symbols,
            this_class: self.method.class,
            return_type: self.method.descriptor.return_type.as_ref(),
            is_constructor: self.method.name == &UnqualifiedName::INIT,
        };
        let code_len = self.method.code.len();

        loop {
            let insn = match self.instructions.get(&pc) {
                Some(insn) => insn.clone(),
                None => return Err((Some(pc), VerifierErrorKind::BranchIntoInstruction(pc))),
            };
            for covered in &mut self.covered[insn.pc..insn.next_pc] {
                *covered = true;
            }
            log::trace!("{:>5}: {} with {}", insn.pc, insn.mnemonic(), frame);

            let at_insn = |kind| (Some(insn.pc), kind);
            let flow = frame.execute(&insn, &env).map_err(at_insn)?;
            self.max_stack = self.max_stack.max(frame.stack_slots());
            self.max_locals = self.max_locals.max(frame.locals.len());

            let falls_through = match flow {
                Flow::Next => true,
                Flow::Branch(target) => {
                    self.branch(target, &frame).map_err(at_insn)?;
                    true
                }
                Flow::Jump(targets) => {
                    for target in targets {
                        self.branch(target, &frame).map_err(at_insn)?;
                    }
                    false
                }
                Flow::Subroutine(target) => {
                    let mut subroutine = frame.clone();
                    subroutine.push(VerificationType::ReturnAddress);
                    self.branch(target, &subroutine).map_err(at_insn)?;
                    if insn.next_pc >= code_len {
                        return Err(at_insn(VerifierErrorKind::FallsOffEnd));
                    }
                    self.branch(insn.next_pc as i64, &frame).map_err(at_insn)?;
                    false
                }
                Flow::Stop => false,
            };

            if !falls_through {
                return Ok(());
            }
            if insn.next_pc >= code_len {
                return Err(at_insn(VerifierErrorKind::FallsOffEnd));
            }
            pc = insn.next_pc;
            if self.merge_points.contains(&pc) {
                return self.branch(pc as i64, &frame).map_err(at_insn);
            }
        }
    }

    fn check_coverage(&self) -> Result<(), (Option<usize>, VerifierErrorKind)> {
        if let Some(start) = self.covered.iter().position(|covered| !covered) {
            let end = self.covered[start..]
                .iter()
                .position(|covered| *covered)
                .map_or(self.covered.len(), |len| start + len);
            return Err((Some(start), VerifierErrorKind::NotCovered { start, end }));
        }
        Ok(())
    }
}
