#![no_main]

use arbitrary::Arbitrary;
use cellflow_array::{MutableArray, ObservableArray};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Edit {
    Set { target: u8, values: Vec<u8> },
    Insert { target: u8, values: Vec<u8> },
    Delete { start: i16, length: u16 },
    Move { source: u8, target: u8, length: u8 },
    Replace(Vec<u8>),
}

impl Edit {
    /// Apply to the plain model. Returns `false` if the edit must be rejected.
    fn apply_model(&self, model: &mut Vec<u8>) -> bool {
        let len = model.len();
        match self {
            Edit::Set { target, values } => {
                let target = usize::from(*target);
                if values.is_empty() {
                    return true;
                }
                if target > len {
                    return false;
                }
                for (offset, value) in values.iter().enumerate() {
                    match model.get_mut(target + offset) {
                        Some(slot) => *slot = *value,
                        None => model.push(*value),
                    }
                }
                true
            }
            Edit::Insert { target, values } => {
                let target = usize::from(*target);
                if values.is_empty() {
                    return true;
                }
                if target > len {
                    return false;
                }
                model.splice(target..target, values.iter().copied());
                true
            }
            Edit::Delete { start, length } => {
                let start = isize::from(*start);
                let end = start + isize::from(*length);
                let first = start.clamp(0, len as isize) as usize;
                let last = end.clamp(0, len as isize) as usize;
                if first < last {
                    model.drain(first..last);
                }
                true
            }
            Edit::Move {
                source,
                target,
                length,
            } => {
                let (source, target, length) =
                    (usize::from(*source), usize::from(*target), usize::from(*length));
                if length == 0 {
                    return true;
                }
                let end = source + length;
                if source >= len || end > len || target > len || (source..=end).contains(&target) {
                    return false;
                }
                let moved: Vec<_> = model.drain(source..end).collect();
                let at = if target > source { target - length } else { target };
                model.splice(at..at, moved);
                true
            }
            Edit::Replace(values) => {
                *model = values.clone();
                true
            }
        }
    }

    fn apply_array(&self, array: &MutableArray<u8>) -> bool {
        match self {
            Edit::Set { target, values } => array
                .set(usize::from(*target), values.iter().copied())
                .is_ok(),
            Edit::Insert { target, values } => array
                .insert(usize::from(*target), values.iter().copied())
                .is_ok(),
            Edit::Delete { start, length } => {
                array.delete(isize::from(*start), usize::from(*length));
                true
            }
            Edit::Move {
                source,
                target,
                length,
            } => array
                .move_within(usize::from(*source), usize::from(*target), usize::from(*length))
                .is_ok(),
            Edit::Replace(values) => array.replace(values.iter().copied()).is_ok(),
        }
    }
}

fuzz_target!(|input: (Vec<u8>, Vec<Edit>)| {
    let (initial, edits) = input;
    let array = MutableArray::new(initial.clone());
    let mapped = array.map(|v| u16::from(*v) + 1);
    let mut model = initial;

    for edit in edits.iter().take(256) {
        if model.len() > 4096 {
            break;
        }
        let accepted = edit.apply_model(&mut model);
        assert_eq!(edit.apply_array(&array), accepted, "{edit:?}");
        assert_eq!(&*array.value(), model.as_slice(), "{edit:?}");
        assert_eq!(mapped.len(), model.len());
    }
});
