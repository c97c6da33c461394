use crate::jvm::{BaseType, FieldType, RefType, RenderDescriptor, SymbolResolver};
use crate::util::Width;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// These types are from [this hierarchy][0], plus the return address type used by `jsr`
///
/// All integral kinds (`boolean`, `byte`, `char`, `short`, `int`) are `Integer`.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se7/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType {
    /// Unusable slot: an unset local, or the second half of a `long` or `double` local
    Top,

    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(RefType),

    /// State of an object after `new` has been called but `<init>` has not
    Uninitialized {
        /// Offset of the `new` instruction
        new_pc: usize,

        /// Type the value will have once initialized
        class: RefType,
    },

    /// Pushed by `jsr` and `jsr_w`, only usable by `astore` and `ret`
    ReturnAddress,
}

impl VerificationType {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long
            | VerificationType::ReturnAddress => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized { .. } => true,
        }
    }

    /// Check if a value of one verification type can be used where another type is expected
    pub fn is_assignable(
        sub_type: &VerificationType,
        super_type: &VerificationType,
        symbols: &dyn SymbolResolver,
    ) -> bool {
        use VerificationType::*;
        match (sub_type, super_type) {
            (Null, Object(_)) => true,
            (Object(t1), Object(t2)) => symbols.is_assignable(t1, t2),
            (t1, t2) => t1 == t2,
        }
    }

    /// Are these two states of the same slot interchangeable at a merge point?
    ///
    /// Primitives and uninitialized objects must match exactly, and any two initialized reference
    /// types are compatible.
    pub fn is_compatible(&self, other: &VerificationType) -> bool {
        self == other
            || (self.is_initialized_reference() && other.is_initialized_reference())
    }

    fn is_initialized_reference(&self) -> bool {
        matches!(self, VerificationType::Null | VerificationType::Object(_))
    }
}

impl From<&FieldType> for VerificationType {
    fn from(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type.clone()),
        }
    }
}

impl Width for VerificationType {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

impl Display for VerificationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VerificationType::Top => f.write_str("top"),
            VerificationType::Integer => f.write_str("int"),
            VerificationType::Float => f.write_str("float"),
            VerificationType::Double => f.write_str("double"),
            VerificationType::Long => f.write_str("long"),
            VerificationType::Null => f.write_str("null"),
            VerificationType::UninitializedThis => f.write_str("uninitializedThis"),
            VerificationType::Object(ref_type) => f.write_str(&ref_type.render()),
            VerificationType::Uninitialized { new_pc, class } => {
                write!(f, "uninitialized({}) {}", new_pc, class.render())
            }
            VerificationType::ReturnAddress => f.write_str("returnAddress"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;
    use crate::jvm::{BinaryName, ClassHierarchy, PoolSymbols};
    use VerificationType::*;

    #[test]
    fn assignability() {
        let constants = ConstantsPool::new();
        let hierarchy = ClassHierarchy::with_java_lang();
        let symbols = PoolSymbols::new(&constants, &hierarchy);

        let string = Object(RefType::STRING);
        let object = Object(RefType::OBJECT);
        let char_sequence = Object(RefType::Object(BinaryName::CHARSEQUENCE));

        assert!(VerificationType::is_assignable(&string, &object, &symbols));
        assert!(VerificationType::is_assignable(&string, &char_sequence, &symbols));
        assert!(!VerificationType::is_assignable(&object, &string, &symbols));
        assert!(VerificationType::is_assignable(&Null, &string, &symbols));
        assert!(!VerificationType::is_assignable(&Null, &Integer, &symbols));
        assert!(!VerificationType::is_assignable(&Long, &Double, &symbols));
        assert!(!VerificationType::is_assignable(
            &Uninitialized {
                new_pc: 0,
                class: RefType::STRING
            },
            &string,
            &symbols
        ));
    }

    #[test]
    fn compatibility() {
        assert!(Integer.is_compatible(&Integer));
        assert!(!Integer.is_compatible(&Float));
        assert!(Null.is_compatible(&Object(RefType::STRING)));
        assert!(Object(RefType::OBJECT).is_compatible(&Object(RefType::STRING)));
        assert!(!Top.is_compatible(&Integer));
        assert!(!ReturnAddress.is_compatible(&Null));

        let uninitialized = Uninitialized {
            new_pc: 3,
            class: RefType::STRING,
        };
        assert!(UninitializedThis.is_compatible(&UninitializedThis));
        assert!(!UninitializedThis.is_compatible(&Object(RefType::OBJECT)));
        assert!(!Object(RefType::OBJECT).is_compatible(&UninitializedThis));
        assert!(!Null.is_compatible(&UninitializedThis));
        assert!(!uninitialized.is_compatible(&Object(RefType::STRING)));
        assert!(!uninitialized.is_compatible(&Uninitialized {
            new_pc: 7,
            class: RefType::STRING,
        }));
        assert!(uninitialized.is_compatible(&uninitialized.clone()));
    }

    #[test]
    fn from_field_types() {
        assert_eq!(VerificationType::from(&FieldType::boolean()), Integer);
        assert_eq!(VerificationType::from(&FieldType::long()).width(), 2);
        assert_eq!(
            VerificationType::from(&FieldType::array(FieldType::int())).to_string(),
            "[I"
        );
    }
}
