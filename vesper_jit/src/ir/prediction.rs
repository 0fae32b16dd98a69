//! The type-prediction lattice.
//!
//! A prediction is a set of primitive-category bits attached to every
//! result-producing node. The empty set is bottom ("no information yet");
//! the join is bitwise union. Predictions only ever grow during
//! propagation, which bounds every fixpoint by lattice height times node
//! count.

use bitflags::bitflags;
use vesper_core::ConstantValue;

bitflags! {
    /// Element of the prediction lattice.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Prediction: u32 {
        /// A 32-bit integer.
        const INT32 = 1 << 0;
        /// A double that is not an int32.
        const DOUBLE = 1 << 1;
        /// A boolean.
        const BOOLEAN = 1 << 2;
        /// A string cell.
        const STRING = 1 << 3;
        /// A function cell.
        const FUNCTION = 1 << 4;
        /// A plain object with no indexed storage.
        const FINAL_OBJECT = 1 << 5;
        /// An array with dynamic indexed storage.
        const ARRAY = 1 << 6;
        /// Some other kind of object (regexp, arguments, host object).
        const OBJECT_OTHER = 1 << 7;
        /// A cell that is none of the above categories.
        const CELL_OTHER = 1 << 8;
        /// A non-cell, non-numeric value (undefined, null).
        const OTHER = 1 << 9;
        /// A byte array.
        const BYTE_ARRAY = 1 << 10;
        /// An Int8Array.
        const INT8_ARRAY = 1 << 11;
        /// An Int16Array.
        const INT16_ARRAY = 1 << 12;
        /// An Int32Array.
        const INT32_ARRAY = 1 << 13;
        /// A Uint8Array.
        const UINT8_ARRAY = 1 << 14;
        /// A Uint8ClampedArray.
        const UINT8_CLAMPED_ARRAY = 1 << 15;
        /// A Uint16Array.
        const UINT16_ARRAY = 1 << 16;
        /// A Uint32Array.
        const UINT32_ARRAY = 1 << 17;
        /// A Float32Array.
        const FLOAT32_ARRAY = 1 << 18;
        /// A Float64Array.
        const FLOAT64_ARRAY = 1 << 19;

        /// Any number.
        const NUMBER = Self::INT32.bits() | Self::DOUBLE.bits();
        /// Any array-like with fixed typed storage.
        const TYPED_ARRAY = Self::BYTE_ARRAY.bits()
            | Self::INT8_ARRAY.bits()
            | Self::INT16_ARRAY.bits()
            | Self::INT32_ARRAY.bits()
            | Self::UINT8_ARRAY.bits()
            | Self::UINT8_CLAMPED_ARRAY.bits()
            | Self::UINT16_ARRAY.bits()
            | Self::UINT32_ARRAY.bits()
            | Self::FLOAT32_ARRAY.bits()
            | Self::FLOAT64_ARRAY.bits();
        /// Any object.
        const OBJECT = Self::FINAL_OBJECT.bits()
            | Self::ARRAY.bits()
            | Self::OBJECT_OTHER.bits()
            | Self::TYPED_ARRAY.bits();
        /// Any heap cell.
        const CELL = Self::OBJECT.bits()
            | Self::STRING.bits()
            | Self::FUNCTION.bits()
            | Self::CELL_OTHER.bits();
    }
}

impl Prediction {
    /// Whether any information has been gathered.
    #[inline]
    pub fn is_set(self) -> bool {
        !self.is_empty()
    }

    /// Join another prediction in, reporting whether the set grew.
    #[inline]
    pub fn merge(&mut self, other: Prediction) -> bool {
        let merged = *self | other;
        let changed = merged != *self;
        *self = merged;
        changed
    }

    /// Exactly an int32.
    #[inline]
    pub fn is_int32(self) -> bool {
        self == Prediction::INT32
    }

    /// Exactly a double.
    #[inline]
    pub fn is_double(self) -> bool {
        self == Prediction::DOUBLE
    }

    /// A number and nothing else.
    #[inline]
    pub fn is_number(self) -> bool {
        self.is_set() && Prediction::NUMBER.contains(self)
    }

    /// Exactly a boolean.
    #[inline]
    pub fn is_boolean(self) -> bool {
        self == Prediction::BOOLEAN
    }

    /// Exactly a string.
    #[inline]
    pub fn is_string(self) -> bool {
        self == Prediction::STRING
    }

    /// Exactly an array.
    #[inline]
    pub fn is_array(self) -> bool {
        self == Prediction::ARRAY
    }

    /// An object of some kind and nothing else.
    #[inline]
    pub fn is_object(self) -> bool {
        self.is_set() && Prediction::OBJECT.contains(self)
    }

    /// A heap cell of some kind and nothing else.
    #[inline]
    pub fn is_cell(self) -> bool {
        self.is_set() && Prediction::CELL.contains(self)
    }

    /// Exactly a byte array.
    #[inline]
    pub fn is_byte_array(self) -> bool {
        self == Prediction::BYTE_ARRAY
    }

    /// Exactly an Int8Array.
    #[inline]
    pub fn is_int8_array(self) -> bool {
        self == Prediction::INT8_ARRAY
    }

    /// Exactly an Int16Array.
    #[inline]
    pub fn is_int16_array(self) -> bool {
        self == Prediction::INT16_ARRAY
    }

    /// Exactly an Int32Array.
    #[inline]
    pub fn is_int32_array(self) -> bool {
        self == Prediction::INT32_ARRAY
    }

    /// Exactly a Uint8Array.
    #[inline]
    pub fn is_uint8_array(self) -> bool {
        self == Prediction::UINT8_ARRAY
    }

    /// Exactly a Uint8ClampedArray.
    #[inline]
    pub fn is_uint8_clamped_array(self) -> bool {
        self == Prediction::UINT8_CLAMPED_ARRAY
    }

    /// Exactly a Uint16Array.
    #[inline]
    pub fn is_uint16_array(self) -> bool {
        self == Prediction::UINT16_ARRAY
    }

    /// Exactly a Uint32Array.
    #[inline]
    pub fn is_uint32_array(self) -> bool {
        self == Prediction::UINT32_ARRAY
    }

    /// Exactly a Float32Array.
    #[inline]
    pub fn is_float32_array(self) -> bool {
        self == Prediction::FLOAT32_ARRAY
    }

    /// Exactly a Float64Array.
    #[inline]
    pub fn is_float64_array(self) -> bool {
        self == Prediction::FLOAT64_ARRAY
    }

    /// An array-like a `PutByVal`/`GetByVal` can act on directly.
    ///
    /// The prediction must name a single concrete storage shape; a mix of
    /// shapes (e.g. `ARRAY | INT8_ARRAY`) is not actionable.
    pub fn is_actionable_mutable_array(self) -> bool {
        self.is_array()
            || self.is_byte_array()
            || self.is_int8_array()
            || self.is_int16_array()
            || self.is_int32_array()
            || self.is_uint8_array()
            || self.is_uint8_clamped_array()
            || self.is_uint16_array()
            || self.is_uint32_array()
            || self.is_float32_array()
            || self.is_float64_array()
    }

    /// An array-like a `GetByVal` can act on directly (strings are
    /// readable but not writable).
    pub fn is_actionable_array(self) -> bool {
        self.is_actionable_mutable_array() || self.is_string()
    }

    /// An object whose indexed storage pointer cannot move under a pure
    /// indexed put (typed storage is allocated once).
    #[inline]
    pub fn is_fixed_indexed_storage_object(self) -> bool {
        self.is_set() && Prediction::TYPED_ARRAY.contains(self)
    }

    /// Classify a constant value.
    pub fn from_value(value: &ConstantValue) -> Prediction {
        match value {
            ConstantValue::Int32(_) => Prediction::INT32,
            ConstantValue::Double(_) => Prediction::DOUBLE,
            ConstantValue::Boolean(_) => Prediction::BOOLEAN,
            ConstantValue::String(_) => Prediction::STRING,
            ConstantValue::Undefined | ConstantValue::Null => Prediction::OTHER,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bottom_is_empty() {
        let p = Prediction::default();
        assert!(!p.is_set());
        assert!(!p.is_number());
        assert!(!p.is_object());
    }

    #[test]
    fn test_merge_is_join() {
        let mut p = Prediction::INT32;
        assert!(p.merge(Prediction::DOUBLE));
        assert_eq!(p, Prediction::NUMBER);
        assert!(!p.merge(Prediction::INT32));
    }

    #[test]
    fn test_number_predicates() {
        assert!(Prediction::INT32.is_int32());
        assert!(Prediction::INT32.is_number());
        assert!(Prediction::NUMBER.is_number());
        assert!(!Prediction::NUMBER.is_int32());
        assert!(!(Prediction::INT32 | Prediction::STRING).is_number());
    }

    #[test]
    fn test_object_predicates() {
        assert!(Prediction::ARRAY.is_object());
        assert!(Prediction::FLOAT64_ARRAY.is_object());
        assert!((Prediction::ARRAY | Prediction::FINAL_OBJECT).is_object());
        assert!(!(Prediction::ARRAY | Prediction::STRING).is_object());
        assert!((Prediction::ARRAY | Prediction::STRING).is_cell());
    }

    #[test]
    fn test_actionable_requires_single_shape() {
        assert!(Prediction::ARRAY.is_actionable_mutable_array());
        assert!(Prediction::INT8_ARRAY.is_actionable_mutable_array());
        assert!(!(Prediction::ARRAY | Prediction::INT8_ARRAY).is_actionable_mutable_array());
        assert!(Prediction::STRING.is_actionable_array());
        assert!(!Prediction::STRING.is_actionable_mutable_array());
    }

    #[test]
    fn test_fixed_indexed_storage() {
        assert!(Prediction::FLOAT32_ARRAY.is_fixed_indexed_storage_object());
        assert!(!Prediction::ARRAY.is_fixed_indexed_storage_object());
        assert!(!Prediction::empty().is_fixed_indexed_storage_object());
    }

    #[test]
    fn test_from_value() {
        assert_eq!(
            Prediction::from_value(&ConstantValue::Int32(3)),
            Prediction::INT32
        );
        assert_eq!(
            Prediction::from_value(&ConstantValue::Double(0.5)),
            Prediction::DOUBLE
        );
        assert_eq!(
            Prediction::from_value(&ConstantValue::string("s")),
            Prediction::STRING
        );
        assert_eq!(
            Prediction::from_value(&ConstantValue::Undefined),
            Prediction::OTHER
        );
    }
}
