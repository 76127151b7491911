macro_rules! trace {
    ( @expand $($args:tt)+ ) => {
        #[cfg(feature = "debug_trace")]
        println!("@expand: {}", format!($($args)+));
    };

    ( @diff $($args:tt)+ ) => {
        #[cfg(feature = "debug_trace")]
        println!("@diff: {}", format!($($args)+));
    };

    ( @wt $($args:tt)+ ) => {
        #[cfg(feature = "debug_trace")]
        println!("@wt: {}", format!($($args)+));
    };
}
