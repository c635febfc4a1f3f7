//! Fatal-error reporting.
//!
//! `kpanic!` is the kernel's one fatal exit: it stamps the call site as
//! `FILE:LINE in function: message` and raises the panic, which the
//! binary's panic handler prints between `Kernel panic!` banner lines
//! before halting. `kassert!` layers a checked-assertion form over it.
//! Rust panics carry no `__func__` equivalent, so the function name is
//! recovered from the type name of a local item at expansion time.

/// Path of the function this macro expands in, without generics.
#[macro_export]
macro_rules! function_name {
    () => {{
        fn f() {}
        fn type_name_of<T>(_: T) -> &'static str {
            core::any::type_name::<T>()
        }
        let name = type_name_of(f);
        &name[..name.len() - 3]
    }};
}

/// Fatal kernel error: panics with `FILE:LINE in function: message`.
#[macro_export]
macro_rules! kpanic {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {
        panic!(
            concat!("{}:{} in {}: ", $fmt),
            file!(),
            line!(),
            $crate::function_name!()
            $(, $arg)*
        )
    };
}

/// Checked invariant: `kpanic!`s with the description when `cond` fails.
#[macro_export]
macro_rules! kassert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            $crate::kpanic!($($arg)+);
        }
    };
}

#[cfg(all(test, not(target_os = "none")))]
mod tests {
    use alloc::string::String;

    #[test]
    fn function_name_names_the_caller() {
        assert!(function_name!().ends_with("function_name_names_the_caller"));
    }

    #[test]
    fn kpanic_stamps_file_line_and_function() {
        let payload = std::panic::catch_unwind(|| {
            kpanic!("boom {}", 7);
        })
        .unwrap_err();
        let message = payload.downcast_ref::<String>().unwrap();
        assert!(message.contains("panic.rs"));
        assert!(message.contains(" in "));
        assert!(message.contains("kpanic_stamps_file_line_and_function"));
        assert!(message.ends_with("boom 7"));
    }

    #[test]
    #[should_panic(expected = "value out of range")]
    fn kassert_fires_on_false_conditions() {
        kassert!(1 + 1 == 3, "value out of range: {}", 3);
    }

    #[test]
    fn kassert_passes_true_conditions() {
        kassert!(1 + 1 == 2, "arithmetic broke");
    }
}
