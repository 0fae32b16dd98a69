//! Opcode definitions for the speculative IR.
//!
//! Every node carries one opcode. Opcodes are a closed enumeration; the
//! properties the optimizer queries in its inner loops (variable-argument
//! membership, must-generate, result production, clobber behavior) come
//! from a constant table so each query is O(1).
//!
//! The discriminant doubles as the opcode identity used by CSE's
//! last-seen table.

use bitflags::bitflags;

bitflags! {
    /// Static properties of an opcode.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpFlags: u8 {
        /// Children live in the shared var-arg table instead of the
        /// three fixed slots.
        const HAS_VAR_ARGS = 1 << 0;
        /// The node executes for effect and holds an artificial
        /// reference on itself.
        const MUST_GENERATE = 1 << 1;
        /// The node produces a value.
        const HAS_RESULT = 1 << 2;
        /// The node invalidates every heap hypothesis unconditionally.
        const CLOBBERS_WORLD = 1 << 3;
        /// The node invalidates heap hypotheses unless its operand
        /// predictions prove it benign.
        const MIGHT_CLOBBER = 1 << 4;
    }
}

/// Opcode of an IR node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    // Constants and locals
    /// A reference to a constant in the code block's constant table.
    JSConstant,
    /// A constant referencing a heap cell the GC may move or collect.
    WeakJSConstant,
    /// Read of a local variable (phi-like reference into predecessors).
    GetLocal,
    /// Write of a local variable.
    SetLocal,
    /// Marks an argument as live-in at function entry.
    SetArgument,
    /// SSA merge point for a local; lives past the last block.
    Phi,
    /// Forces a local to be flushed to the stack.
    Flush,
    /// A former node kept alive for exit state; generates no code.
    Phantom,
    /// A fully neutralized node.
    Nop,
    /// Marks the start of an inlined frame.
    InlineStart,
    /// Debugger breakpoint.
    Breakpoint,

    // Bitwise and conversions
    /// Bitwise and.
    BitAnd,
    /// Bitwise or.
    BitOr,
    /// Bitwise xor.
    BitXor,
    /// Left shift.
    BitLShift,
    /// Signed right shift.
    BitRShift,
    /// Unsigned right shift.
    BitURShift,
    /// Truncation of a value to int32.
    ValueToInt32,
    /// Reinterpretation of an unsigned 32-bit result as a number.
    UInt32ToNumber,

    // Arithmetic
    /// Generic addition; may concatenate strings.
    ValueAdd,
    /// Numeric addition.
    ArithAdd,
    /// Numeric subtraction.
    ArithSub,
    /// Numeric multiplication.
    ArithMul,
    /// Numeric division.
    ArithDiv,
    /// Numeric remainder.
    ArithMod,
    /// Absolute value.
    ArithAbs,
    /// Minimum of two numbers.
    ArithMin,
    /// Maximum of two numbers.
    ArithMax,
    /// Square root.
    ArithSqrt,

    // Logic and comparison
    /// Boolean negation.
    LogicalNot,
    /// Less-than comparison.
    CompareLess,
    /// Less-or-equal comparison.
    CompareLessEq,
    /// Greater-than comparison.
    CompareGreater,
    /// Greater-or-equal comparison.
    CompareGreaterEq,
    /// Loose equality.
    CompareEq,
    /// Strict equality.
    CompareStrictEq,
    /// `instanceof` test.
    InstanceOf,
    /// Guard that a value has a hasInstance implementation.
    CheckHasInstance,

    // Named and indexed property access
    /// Named property read.
    GetById,
    /// Named property read that also flushes cached state.
    GetByIdFlush,
    /// Named property write.
    PutById,
    /// Named property define (no prototype walk).
    PutByIdDirect,
    /// Indexed property read.
    GetByVal,
    /// Indexed property write.
    PutByVal,
    /// Indexed property write known to alias a prior read's location.
    PutByValAlias,
    /// Read of a property at a known storage offset.
    GetByOffset,
    /// Write of a property at a known storage offset.
    PutByOffset,
    /// Read of an object's out-of-line property storage pointer.
    GetPropertyStorage,
    /// Read of an object's indexed storage pointer.
    GetIndexedPropertyStorage,
    /// Guard that an object's structure is in a set.
    CheckStructure,
    /// Structure transition.
    PutStructure,
    /// Guard that a value is a specific function.
    CheckFunction,

    // Globals and scope
    /// Global variable read.
    GetGlobalVar,
    /// Global variable write.
    PutGlobalVar,
    /// Read of a variable in an activation at a known depth.
    GetScopedVar,
    /// Write of a variable in an activation at a known depth.
    PutScopedVar,
    /// Walk of the scope chain to a fixed depth.
    GetScopeChain,
    /// Dynamic name resolution.
    Resolve,
    /// Dynamic resolution of a base object.
    ResolveBase,
    /// Dynamic base resolution for a strict-mode put.
    ResolveBaseStrictPut,
    /// Resolution known to land on the global object.
    ResolveGlobal,

    // Allocation and this
    /// The callee of the current frame.
    GetCallee,
    /// Allocation of `this` for a constructor call.
    CreateThis,
    /// Coercion of `this` to an object.
    ConvertThis,
    /// Coercion of a value to a primitive.
    ToPrimitive,
    /// Empty object literal.
    NewObject,
    /// Array literal.
    NewArray,
    /// Array literal from a constant buffer.
    NewArrayBuffer,
    /// Regexp literal.
    NewRegexp,

    // Array and string intrinsics
    /// Array push.
    ArrayPush,
    /// Array pop.
    ArrayPop,
    /// Single-character string read.
    StringCharAt,
    /// Character code read.
    StringCharCodeAt,
    /// N-way string concatenation.
    StrCat,

    // Calls
    /// Function call.
    Call,
    /// Constructor call.
    Construct,

    // Length reads, introduced by the fixup rewrite
    /// Array length read.
    GetArrayLength,
    /// String length read.
    GetStringLength,
    /// Byte array length read.
    GetByteArrayLength,
    /// Int8Array length read.
    GetInt8ArrayLength,
    /// Int16Array length read.
    GetInt16ArrayLength,
    /// Int32Array length read.
    GetInt32ArrayLength,
    /// Uint8Array length read.
    GetUint8ArrayLength,
    /// Uint8ClampedArray length read.
    GetUint8ClampedArrayLength,
    /// Uint16Array length read.
    GetUint16ArrayLength,
    /// Uint32Array length read.
    GetUint32ArrayLength,
    /// Float32Array length read.
    GetFloat32ArrayLength,
    /// Float64Array length read.
    GetFloat64ArrayLength,

    // Control
    /// Unconditional jump.
    Jump,
    /// Conditional branch.
    Branch,
    /// Function return.
    Return,
    /// Exception throw.
    Throw,
    /// ReferenceError throw.
    ThrowReferenceError,
    /// Unconditional bailout to the lower tier.
    ForceOSRExit,
}

impl Opcode {
    /// Number of opcodes; sizes the last-seen table.
    pub const COUNT: usize = Opcode::ForceOSRExit as usize + 1;

    /// The small numeric identity for last-seen lookups.
    #[inline]
    pub const fn id(self) -> usize {
        self as usize
    }

    /// Static property bits for this opcode.
    pub const fn properties(self) -> OpFlags {
        use Opcode::*;
        match self {
            JSConstant | WeakJSConstant | GetLocal | Phi => OpFlags::HAS_RESULT,

            SetLocal | SetArgument | Flush | Phantom | InlineStart | Breakpoint => {
                OpFlags::MUST_GENERATE
            }

            Nop => OpFlags::empty(),

            BitAnd | BitOr | BitXor | BitLShift | BitRShift | BitURShift | ValueToInt32
            | UInt32ToNumber => OpFlags::HAS_RESULT,

            ValueAdd => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::MIGHT_CLOBBER),

            ArithAdd | ArithSub | ArithMul | ArithDiv | ArithMod | ArithAbs | ArithMin
            | ArithMax | ArithSqrt => OpFlags::HAS_RESULT,

            LogicalNot => OpFlags::HAS_RESULT.union(OpFlags::MIGHT_CLOBBER),

            CompareLess | CompareLessEq | CompareGreater | CompareGreaterEq | CompareEq => {
                OpFlags::HAS_RESULT
                    .union(OpFlags::MUST_GENERATE)
                    .union(OpFlags::MIGHT_CLOBBER)
            }

            CompareStrictEq => OpFlags::HAS_RESULT,

            InstanceOf => OpFlags::HAS_RESULT.union(OpFlags::MUST_GENERATE),
            CheckHasInstance => OpFlags::MUST_GENERATE,

            GetById | GetByIdFlush => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::CLOBBERS_WORLD),

            PutById | PutByIdDirect => OpFlags::MUST_GENERATE.union(OpFlags::CLOBBERS_WORLD),

            GetByVal => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::MIGHT_CLOBBER),

            // Stores stay conservative for the generic clobber query;
            // the load-elimination scans that can do better match them
            // before asking.
            PutByVal | PutByValAlias => OpFlags::MUST_GENERATE.union(OpFlags::CLOBBERS_WORLD),

            GetByOffset | GetPropertyStorage => OpFlags::HAS_RESULT,
            GetIndexedPropertyStorage => OpFlags::HAS_RESULT.union(OpFlags::MUST_GENERATE),
            PutByOffset => OpFlags::MUST_GENERATE,

            CheckStructure | PutStructure | CheckFunction => OpFlags::MUST_GENERATE,

            GetGlobalVar | GetScopedVar | GetScopeChain => OpFlags::HAS_RESULT,
            PutGlobalVar | PutScopedVar => OpFlags::MUST_GENERATE,

            Resolve | ResolveBase | ResolveBaseStrictPut | ResolveGlobal => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::CLOBBERS_WORLD),

            GetCallee => OpFlags::HAS_RESULT,

            CreateThis | ConvertThis | ToPrimitive => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::CLOBBERS_WORLD),

            NewObject | NewArrayBuffer | NewRegexp => {
                OpFlags::HAS_RESULT.union(OpFlags::MUST_GENERATE)
            }

            NewArray => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::HAS_VAR_ARGS),

            ArrayPush | ArrayPop => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::CLOBBERS_WORLD),

            StringCharAt | StringCharCodeAt => {
                OpFlags::HAS_RESULT.union(OpFlags::MUST_GENERATE)
            }

            StrCat => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::CLOBBERS_WORLD)
                .union(OpFlags::HAS_VAR_ARGS),

            Call | Construct => OpFlags::HAS_RESULT
                .union(OpFlags::MUST_GENERATE)
                .union(OpFlags::CLOBBERS_WORLD)
                .union(OpFlags::HAS_VAR_ARGS),

            GetArrayLength | GetStringLength | GetByteArrayLength | GetInt8ArrayLength
            | GetInt16ArrayLength | GetInt32ArrayLength | GetUint8ArrayLength
            | GetUint8ClampedArrayLength | GetUint16ArrayLength | GetUint32ArrayLength
            | GetFloat32ArrayLength | GetFloat64ArrayLength => OpFlags::HAS_RESULT,

            Jump | Branch | Return | Throw | ThrowReferenceError | ForceOSRExit => {
                OpFlags::MUST_GENERATE
            }
        }
    }

    /// Whether children live in the shared var-arg table.
    #[inline]
    pub const fn has_var_args(self) -> bool {
        self.properties().contains(OpFlags::HAS_VAR_ARGS)
    }

    /// Whether the node executes for effect.
    #[inline]
    pub const fn must_generate(self) -> bool {
        self.properties().contains(OpFlags::MUST_GENERATE)
    }

    /// Whether the node produces a value.
    #[inline]
    pub const fn has_result(self) -> bool {
        self.properties().contains(OpFlags::HAS_RESULT)
    }

    /// Whether the node unconditionally invalidates heap hypotheses.
    #[inline]
    pub const fn always_clobbers_world(self) -> bool {
        self.properties().contains(OpFlags::CLOBBERS_WORLD)
    }

    /// Whether clobbering depends on operand predictions.
    #[inline]
    pub const fn might_clobber(self) -> bool {
        self.properties().contains(OpFlags::MIGHT_CLOBBER)
    }

    /// Whether the node carries arithmetic-usage flags that are
    /// meaningful for CSE key comparison.
    #[inline]
    pub const fn has_arith_flags(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            UInt32ToNumber | ValueAdd | ArithAdd | ArithSub | ArithMul | ArithDiv | ArithMod
                | ArithAbs | ArithMin | ArithMax
        )
    }
}

// =============================================================================
// Tests
// =============================================================================
