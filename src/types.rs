//! Type equality, assignability, usual arithmetic conversions, and
//! struct/union layout.
//!
//! Grounded on `examples/original_source/src/typecheck/typecheck.c` for the
//! conversion-rank table and layout rules; teacher's
//! `crates/compiler/src/types.rs` for the Rust shape (a plain type enum plus
//! free functions rather than a trait hierarchy).

use crate::ast::{CType, StructDef, TypeMods};
use std::rc::Rc;

/// Strip typedefs, parens and `Modifier` wrappers down to the bare
/// structural type (`spec.md` §4.4.1). This discards signedness along with
/// everything else a `Modifier` carries, so callers that need to know
/// whether a type is unsigned (`is_unsigned`, `usual_arithmetic_conversion`)
/// must inspect the original, unstripped type instead of calling this first.
pub fn strip(ty: &CType) -> CType {
    match ty {
        CType::TypedefRef(_, target) => strip(target),
        CType::Paren(inner) => strip(inner),
        CType::Modifier { base, mods } => {
            let inner = strip(base);
            // extern/typedef/inline/static/auto/register never affect
            // equality; const/volatile/restrict/signed/unsigned do, but
            // they're represented on Ptr/primitive forms directly here, so
            // a bare Modifier wrapping a primitive just resolves to that
            // primitive (signedness is captured by `effective_signed`).
            inner.clone()
        }
        other => other.clone(),
    }
}

pub fn is_integer(ty: &CType) -> bool {
    matches!(
        strip(ty),
        CType::Bool
            | CType::Char
            | CType::Short
            | CType::Int
            | CType::Long
            | CType::LongLong
            | CType::Enum(_)
    )
}

pub fn is_float(ty: &CType) -> bool {
    matches!(strip(ty), CType::Float | CType::Double | CType::LongDouble)
}

pub fn is_arithmetic(ty: &CType) -> bool {
    is_integer(ty) || is_float(ty)
}

pub fn is_pointer(ty: &CType) -> bool {
    matches!(strip(ty), CType::Ptr { .. })
}

pub fn is_array(ty: &CType) -> bool {
    matches!(strip(ty), CType::Array { .. })
}

pub fn is_function(ty: &CType) -> bool {
    matches!(strip(ty), CType::Func { .. })
}

pub fn is_scalar(ty: &CType) -> bool {
    is_arithmetic(ty) || is_pointer(ty)
}

/// Conversion rank, highest first, ignoring signedness: `spec.md` §4.4.1
/// "usual arithmetic conversions".
fn rank(ty: &CType) -> u8 {
    match strip(ty) {
        CType::LongDouble => 6,
        CType::Double => 5,
        CType::Float => 4,
        CType::LongLong | CType::Long => 3,
        CType::Int | CType::Enum(_) => 2,
        CType::Short => 1,
        CType::Char | CType::Bool => 0,
        _ => 0,
    }
}

/// Integer promotion: operands narrower than `int` become `int` (`spec.md`
/// §4.4.1).
pub fn promote(ty: &CType) -> CType {
    let s = strip(ty);
    match s {
        CType::Bool | CType::Char | CType::Short => CType::Int,
        other => other,
    }
}

/// Signedness is carried on a `Modifier` wrapper, so this must walk the
/// type *before* `strip`/`promote` discard it, exactly as `codegen`'s
/// `is_unsigned_cty` does — stripping first (the earlier bug here) can only
/// ever observe a bare primitive and so never sees anything but `Bool`.
fn is_unsigned(ty: &CType) -> bool {
    match ty {
        CType::Modifier { mods, base } => mods.is_unsigned || is_unsigned(base),
        CType::TypedefRef(_, t) | CType::Paren(t) => is_unsigned(t),
        CType::Bool => true,
        _ => false,
    }
}

/// Reattach an `unsigned` modifier to a result type that came out of
/// `promote`/`strip` (both discard `Modifier`), so unsignedness survives
/// into the returned common type.
fn with_unsigned(ty: CType) -> CType {
    CType::Modifier {
        mods: TypeMods { is_unsigned: true, ..TypeMods::default() },
        base: Box::new(ty),
    }
}

/// `type_max`: the common type of a binary arithmetic operation (`spec.md`
/// §4.4.1).
pub fn usual_arithmetic_conversion(a: &CType, b: &CType) -> CType {
    if matches!(strip(a), CType::LongDouble) || matches!(strip(b), CType::LongDouble) {
        return CType::LongDouble;
    }
    if matches!(strip(a), CType::Double) || matches!(strip(b), CType::Double) {
        return CType::Double;
    }
    if matches!(strip(a), CType::Float) || matches!(strip(b), CType::Float) {
        return CType::Float;
    }
    let pa = promote(a);
    let pb = promote(b);
    let (ra, rb) = (rank(&pa), rank(&pb));
    let a_unsigned = is_unsigned(a);
    let b_unsigned = is_unsigned(b);
    if ra == rb {
        if a_unsigned || b_unsigned {
            return with_unsigned(if a_unsigned { pa } else { pb });
        }
        pa
    } else if ra > rb {
        if a_unsigned { with_unsigned(pa) } else { pa }
    } else if b_unsigned {
        with_unsigned(pb)
    } else {
        pb
    }
}

/// Structural equality for function and array types, nominal (pointer)
/// equality for struct/union/enum (`spec.md` §4.4.1).
pub fn types_equal(a: &CType, b: &CType) -> bool {
    let (a, b) = (strip(a), strip(b));
    match (&a, &b) {
        (CType::Void, CType::Void)
        | (CType::Bool, CType::Bool)
        | (CType::Char, CType::Char)
        | (CType::Short, CType::Short)
        | (CType::Int, CType::Int)
        | (CType::Long, CType::Long)
        | (CType::LongLong, CType::LongLong)
        | (CType::Float, CType::Float)
        | (CType::Double, CType::Double)
        | (CType::LongDouble, CType::LongDouble)
        | (CType::VaList, CType::VaList) => true,
        (CType::Struct(x), CType::Struct(y)) => Rc::ptr_eq(x, y),
        (CType::Enum(x), CType::Enum(y)) => Rc::ptr_eq(x, y),
        (CType::Ptr { base: ba, .. }, CType::Ptr { base: bb, .. }) => types_equal(ba, bb),
        (
            CType::Array {
                base: ba,
                resolved_nelems: na,
                ..
            },
            CType::Array {
                base: bb,
                resolved_nelems: nb,
                ..
            },
        ) => types_equal(ba, bb) && na == nb,
        (
            CType::Func {
                ret: ra,
                params: pa,
                variadic: va,
            },
            CType::Func {
                ret: rb,
                params: pb,
                variadic: vb,
            },
        ) => {
            va == vb
                && pa.len() == pb.len()
                && types_equal(ra, rb)
                && pa.iter().zip(pb.iter()).all(|(x, y)| types_equal(x, y))
        }
        _ => false,
    }
}

fn base_of_pointer(ty: &CType) -> Option<CType> {
    match strip(ty) {
        CType::Ptr { base, .. } => Some(*base),
        CType::Array { base, .. } => Some(*base),
        CType::Func { .. } => Some(strip(ty)),
        _ => None,
    }
}

/// `to ← from`: returns `Ok(warn)` where `warn` is `Some(message)` for a
/// legal-but-suspicious assignment, or `Err(message)` if disallowed
/// (`spec.md` §4.4.1).
pub fn check_assignable(to: &CType, from: &CType) -> Result<Option<&'static str>, &'static str> {
    if types_equal(to, from) {
        return Ok(None);
    }
    let (sto, sfrom) = (strip(to), strip(from));
    match (&sto, &sfrom) {
        (t, _) if t.is_void() => Err("cannot assign to void"),
        (_, f) if f.is_void() => Err("void value not ignored as it ought to be"),
        (t, f) if is_arithmetic(t) && (is_arithmetic(f) || matches!(f, CType::Enum(_))) => Ok(None),
        (t, f) if is_arithmetic(t) && is_pointer(f) => {
            Ok(Some("integer from pointer without a cast"))
        }
        (t, f) if is_pointer(t) && is_integer(f) => Ok(None),
        (t, f) if is_pointer(t) && is_pointer(f) => {
            let (bt, bf) = (base_of_pointer(&sto), base_of_pointer(&sfrom));
            match (bt, bf) {
                (Some(bt), _) if bt.is_void() => Ok(None),
                (_, Some(bf)) if bf.is_void() => Ok(None),
                (Some(bt), Some(bf)) if types_equal(&bt, &bf) => Ok(None),
                _ => Err("incompatible pointer types"),
            }
        }
        (t, f) if is_pointer(t) && (is_array(f) || is_function(f)) => {
            let (bt, bf) = (base_of_pointer(&sto), base_of_pointer(&sfrom));
            match (bt, bf) {
                (Some(bt), Some(bf)) if types_equal(&bt, &bf) => Ok(None),
                _ => Err("incompatible pointer types"),
            }
        }
        (CType::Array { base: bt, resolved_nelems: lt, .. }, CType::Array { base: bf, resolved_nelems: lf, .. }) => {
            if types_equal(bt, bf) && (lt.is_none() || lf.is_none() || lt == lf) {
                Ok(None)
            } else {
                Err("incompatible array types")
            }
        }
        (CType::Struct(st), CType::Struct(sf)) => {
            if Rc::ptr_eq(st, sf) {
                Ok(None)
            } else {
                Err("incompatible struct/union types")
            }
        }
        _ => Err("incompatible types in assignment"),
    }
}

/// Size in bytes for a complete object type (x86-64 ABI); `0` for
/// incomplete/void.
pub fn size_of(ty: &CType) -> u32 {
    match strip(ty) {
        CType::Void => 0,
        CType::Bool | CType::Char => 1,
        CType::Short => 2,
        CType::Int | CType::Float => 4,
        CType::Long | CType::LongLong | CType::Double => 8,
        CType::LongDouble => 16,
        CType::VaList => 24, // one `{i32,i32,i8*,i8*}` register-save slot
        CType::Ptr { .. } => 8,
        CType::Enum(_) => 4,
        CType::Struct(def) => def.size.get(),
        CType::Array {
            base,
            resolved_nelems: Some(n),
            ..
        } => size_of(&base) * n as u32,
        _ => 0,
    }
}

pub fn align_of(ty: &CType) -> u32 {
    match strip(ty) {
        CType::Struct(def) => def.align.get(),
        CType::Array { base, .. } => align_of(&base),
        other => size_of(&other).max(1),
    }
}

/// Lay out a struct/union's fields, computing each field's offset and the
/// aggregate's overall size/alignment (`spec.md` §4.4.1 "Sizes and
/// layout"). Must be called once, after all fields are known, before the
/// definition is marked complete.
pub fn layout_struct(def: &Rc<StructDef>) {
    let mut fields = def.fields.borrow_mut();
    let mut offset: u32 = 0;
    let mut max_align: u32 = 1;
    for field in fields.iter_mut() {
        let align = align_of(&field.ty).max(1);
        max_align = max_align.max(align);
        if def.is_union {
            field.offset.set(0);
        } else {
            offset = round_up(offset, align);
            field.offset.set(offset);
            offset += size_of(&field.ty);
        }
    }
    let raw_size = if def.is_union {
        fields
            .iter()
            .map(|f| size_of(&f.ty))
            .max()
            .unwrap_or(0)
    } else {
        offset
    };
    def.size.set(round_up(raw_size, max_align));
    def.align.set(max_align);
    def.complete.set(true);
}

fn round_up(n: u32, align: u32) -> u32 {
    if align == 0 {
        n
    } else {
        (n + align - 1) / align * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Field;
    use std::cell::{Cell, RefCell};

    fn field(ty: CType) -> Field {
        Field {
            name: None,
            ty,
            bitfield: None,
            offset: Cell::new(0),
        }
    }

    #[test]
    fn usual_arithmetic_conversion_prefers_double_over_int() {
        let t = usual_arithmetic_conversion(&CType::Double, &CType::Int);
        assert!(matches!(t, CType::Double));
    }

    #[test]
    fn integer_promotion_widens_char_to_int() {
        assert!(matches!(promote(&CType::Char), CType::Int));
    }

    #[test]
    fn equal_rank_unsigned_operand_makes_the_result_unsigned() {
        let unsigned_int = CType::Modifier {
            mods: TypeMods { is_unsigned: true, ..TypeMods::default() },
            base: Box::new(CType::Int),
        };
        let t = usual_arithmetic_conversion(&unsigned_int, &CType::Int);
        assert!(matches!(t, CType::Modifier { mods, .. } if mods.is_unsigned));
    }

    #[test]
    fn struct_equality_is_nominal() {
        let a = StructDef::incomplete(None, false);
        let b = StructDef::incomplete(None, false);
        assert!(!types_equal(&CType::Struct(a.clone()), &CType::Struct(b)));
        assert!(types_equal(&CType::Struct(a.clone()), &CType::Struct(a)));
    }

    #[test]
    fn struct_layout_pads_fields_to_alignment() {
        let def = StructDef::incomplete(None, false);
        *def.fields.borrow_mut() = vec![field(CType::Char), field(CType::Int)];
        layout_struct(&def);
        let fields = def.fields.borrow();
        assert_eq!(fields[0].offset.get(), 0);
        assert_eq!(fields[1].offset.get(), 4);
        assert_eq!(def.size.get(), 8);
        assert_eq!(def.align.get(), 4);
    }

    #[test]
    fn union_size_is_max_member_size() {
        let def = StructDef::incomplete(None, true);
        *def.fields.borrow_mut() = vec![field(CType::Char), field(CType::Long)];
        layout_struct(&def);
        assert_eq!(def.size.get(), 8);
        assert_eq!(def.align.get(), 8);
        assert!(def.fields.borrow().iter().all(|f| f.offset.get() == 0));
    }

    #[test]
    fn pointer_to_void_is_assignable_either_direction() {
        let void_ptr = CType::ptr_to(CType::Void);
        let int_ptr = CType::ptr_to(CType::Int);
        assert!(check_assignable(&void_ptr, &int_ptr).is_ok());
        assert!(check_assignable(&int_ptr, &void_ptr).is_ok());
    }

    #[test]
    fn integer_from_pointer_warns_but_is_allowed() {
        let result = check_assignable(&CType::Int, &CType::ptr_to(CType::Int));
        assert_eq!(result, Ok(Some("integer from pointer without a cast")));
    }
}
