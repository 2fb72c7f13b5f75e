use std::fmt;
use std::sync::Arc;

use crate::compiler::ast::CmpOp;
use crate::output::CaptureMode;
use crate::value::Value;

/// This loop has the loop var.
pub const LOOP_FLAG_WITH_LOOP_VAR: u8 = 1;

/// This loop is recursive.
pub const LOOP_FLAG_RECURSIVE: u8 = 2;

/// The macro references `caller()`.
pub const MACRO_CALLER: u8 = 1;

/// Represents an instruction for the VM.
///
/// Instructions reference the constant, string and name pools of the
/// [`Bytecode`] they belong to by index.
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// Emits raw template data from the string pool.
    EmitText(u32),
    /// Pops n values, applies finalization and auto escaping, emits them.
    Output(u16),
    /// Pushes a value from the constant pool.
    LoadConst(u32),
    /// Resolves a name from the name pool in the scope chain and pushes it.
    Lookup(u32),
    /// Pops a value and stores it under a name in the current frame.
    StoreVar(u32),
    /// Pops an object and pushes the named attribute.
    GetAttr(u32),
    /// Pops object and value and assigns the named attribute.
    SetAttr(u32),
    /// Pops key and object and pushes the item.
    GetItem,
    /// Pops step, stop, start and object and pushes the slice.
    Slice,
    /// Builds a list of the last n values on the stack.
    BuildList(u16),
    /// Builds a map of the last 2n values on the stack.
    BuildMap(u16),
    /// Builds a kwargs capsule of the last 2n values on the stack.
    BuildKwargs(u16),
    /// Unpacks a list into n stack items.
    UnpackList(u16),
    /// Appends the stack top to the list below it.
    ListAppend,
    /// Add the top two values.
    Add,
    /// Subtract the top two values.
    Sub,
    /// Multiply the top two values.
    Mul,
    /// Divide the top two values.
    Div,
    /// Integer divide the top two values.
    IntDiv,
    /// Calculate the remainder of the top two values.
    Rem,
    /// x to the power of y.
    Pow,
    /// Negates the value.
    Neg,
    /// Boolean negation.
    Not,
    /// String concatenation via coercion (the `~` operator).
    StringConcat,
    /// Pops two values and pushes the comparison result.
    Cmp(CmpOp),
    /// Jump to a specific instruction.
    Jump(u32),
    /// Jump if the stack top evaluates to false.
    JumpIfFalse(u32),
    /// Jump if the stack top evaluates to false, otherwise pop the value.
    JumpIfFalseOrPop(u32),
    /// Jump if the stack top evaluates to true, otherwise pop the value.
    JumpIfTrueOrPop(u32),
    /// Starts a loop over the popped iterable.  The argument are loop flags.
    PushLoop(u8),
    /// Does a single loop iteration.
    ///
    /// The argument is the jump target for when the loop ends.
    Iterate(u32),
    /// Pushes whether the innermost loop did not iterate.
    PushDidNotIterate,
    /// Pushes a plain scope frame.
    PushWith,
    /// Pops the topmost frame.
    PopFrame,
    /// Pops a loop frame, resuming a pending recursion jump if set.
    PopLoopFrame,
    /// Sets the auto escape flag from the popped value.
    PushAutoEscape,
    /// Resets the auto escape flag to the previous value.
    PopAutoEscape,
    /// Begins capturing of output.
    BeginCapture(CaptureMode),
    /// Ends capturing of output and pushes the captured value.
    EndCapture,
    /// Applies a filter from the name pool with n args.
    ApplyFilter(u32, u16),
    /// Performs a test from the name pool with n args.
    PerformTest(u32, u16),
    /// Calls a named function with n args.
    CallFunction(u32, u16),
    /// Calls a method on an object with n args (including the object).
    CallMethod(u32, u16),
    /// Calls the object on the stack with n args (including the object).
    CallObject(u16),
    /// Duplicates the top item.
    DupTop,
    /// Discards the top item.
    DiscardTop,
    /// Swaps the top two items.
    Swap,
    /// Rotates the top three items (top goes below the next two).
    Rot3,
    /// Renders the parent block without intermediate capturing.
    FastSuper,
    /// Recurses the current loop without intermediate capturing.
    FastRecurse,
    /// Calls into a block by name.
    CallBlock(u32),
    /// Loads blocks from the parent template on the stack (`extends`).
    LoadBlocks,
    /// Includes another template whose name is on the stack.
    Include {
        /// Whether to silently skip rendering if the template is missing.
        ignore_missing: bool,
        /// Whether to pass the current context into the included template.
        with_context: bool,
    },
    /// Pops a template name and pushes the template's exports as a module.
    ImportModule,
    /// Builds a macro.  Operands: name index, body offset, flags.
    BuildMacro(u32, u32, u8),
    /// Emits a debug dump of the current context.
    EmitDebug,
    /// Breaks from the interpreter loop (exits a macro or block).
    Return,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub(crate) struct LineInfo {
    pub first_instruction: u32,
    pub line: u32,
}

/// A compiled unit of instructions with its pools and line table.
///
/// Bytecode is immutable once produced by the code generator and can be
/// freely shared between threads.
#[derive(Clone, PartialEq)]
pub struct Bytecode {
    pub(crate) instructions: Vec<Instr>,
    pub(crate) consts: Vec<Value>,
    pub(crate) strings: Vec<Arc<str>>,
    pub(crate) names: Vec<Arc<str>>,
    pub(crate) line_infos: Vec<LineInfo>,
    pub(crate) name: Arc<str>,
}

impl Bytecode {
    /// Creates a new empty bytecode object for a template name.
    pub fn new(name: &str) -> Bytecode {
        Bytecode {
            instructions: Vec::new(),
            consts: Vec::new(),
            strings: Vec::new(),
            names: Vec::new(),
            line_infos: Vec::new(),
            name: Arc::from(name),
        }
    }

    /// Returns the name of the template this bytecode belongs to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns an instruction by index.
    #[inline(always)]
    pub fn get(&self, idx: usize) -> Option<&Instr> {
        self.instructions.get(idx)
    }

    /// Returns an instruction by index mutably.
    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut Instr> {
        self.instructions.get_mut(idx)
    }

    /// Adds a new instruction.
    pub(crate) fn add(&mut self, instr: Instr) -> usize {
        let rv = self.instructions.len();
        self.instructions.push(instr);
        rv
    }

    /// Adds a new instruction with a line record.
    pub(crate) fn add_with_line(&mut self, instr: Instr, line: u32) -> usize {
        let rv = self.add(instr);
        let same_loc = self
            .line_infos
            .last()
            .map_or(false, |last_loc| last_loc.line == line);
        if !same_loc {
            self.line_infos.push(LineInfo {
                first_instruction: rv as u32,
                line,
            });
        }
        rv
    }

    /// Looks up the line for an instruction.
    pub fn get_line(&self, idx: usize) -> Option<usize> {
        let loc = match self
            .line_infos
            .binary_search_by_key(&idx, |x| x.first_instruction as usize)
        {
            Ok(idx) => &self.line_infos[idx],
            Err(0) => return None,
            Err(idx) => &self.line_infos[idx - 1],
        };
        Some(loc.line as usize)
    }

    /// Interns a constant and returns its pool index.
    pub(crate) fn add_const(&mut self, value: Value) -> u32 {
        match self.consts.iter().position(|x| *x == value) {
            Some(idx) => idx as u32,
            None => {
                self.consts.push(value);
                (self.consts.len() - 1) as u32
            }
        }
    }

    /// Interns raw template data and returns its pool index.
    pub(crate) fn add_string(&mut self, value: &str) -> u32 {
        match self.strings.iter().position(|x| x as &str == value) {
            Some(idx) => idx as u32,
            None => {
                self.strings.push(Arc::from(value));
                (self.strings.len() - 1) as u32
            }
        }
    }

    /// Interns a name and returns its pool index.
    pub(crate) fn add_name(&mut self, value: &str) -> u32 {
        match self.names.iter().position(|x| x as &str == value) {
            Some(idx) => idx as u32,
            None => {
                self.names.push(Arc::from(value));
                (self.names.len() - 1) as u32
            }
        }
    }

    /// Resolves a constant from the pool.
    #[inline(always)]
    pub(crate) fn const_at(&self, idx: u32) -> &Value {
        &self.consts[idx as usize]
    }

    /// Resolves raw template data from the pool.
    #[inline(always)]
    pub(crate) fn string_at(&self, idx: u32) -> &Arc<str> {
        &self.strings[idx as usize]
    }

    /// Resolves a name from the pool.
    #[inline(always)]
    pub(crate) fn name_at(&self, idx: u32) -> &Arc<str> {
        &self.names[idx as usize]
    }

    /// Returns the number of instructions.
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Do we have any instructions?
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}

impl fmt::Debug for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        struct InstrWrapper<'a>(usize, &'a Instr, Option<usize>);

        impl<'a> fmt::Debug for InstrWrapper<'a> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                ok!(write!(f, "{:>05x} | {:?}", self.0, self.1));
                if let Some(line) = self.2 {
                    ok!(write!(f, "  [line {}]", line));
                }
                Ok(())
            }
        }

        let mut list = f.debug_list();
        let mut last_line = None;
        for (idx, instr) in self.instructions.iter().enumerate() {
            let line = self.get_line(idx);
            list.entry(&InstrWrapper(
                idx,
                instr,
                if line != last_line { line } else { None },
            ));
            last_line = line;
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use similar_asserts::assert_eq;

    #[test]
    fn test_pools_dedup() {
        let mut bc = Bytecode::new("test");
        assert_eq!(bc.add_name("foo"), 0);
        assert_eq!(bc.add_name("bar"), 1);
        assert_eq!(bc.add_name("foo"), 0);
        assert_eq!(bc.add_const(Value::from(1)), 0);
        assert_eq!(bc.add_const(Value::from(1)), 0);
        assert_eq!(bc.add_const(Value::from(2)), 1);
    }

    #[test]
    fn test_line_table() {
        let mut bc = Bytecode::new("test");
        bc.add_with_line(Instr::GetItem, 1);
        bc.add_with_line(Instr::GetItem, 1);
        bc.add_with_line(Instr::GetItem, 2);
        assert_eq!(bc.get_line(0), Some(1));
        assert_eq!(bc.get_line(1), Some(1));
        assert_eq!(bc.get_line(2), Some(2));
        assert_eq!(bc.line_infos.len(), 2);
    }
}
