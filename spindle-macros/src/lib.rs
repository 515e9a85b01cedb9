//! Procedural macros for the `spindle` runtime.
//!
//! - `#[spindle::main]` and `#[spindle::test]` turn an `async fn` into a
//!   synchronous one that starts a runtime and blocks on the body,
//! - `join!` awaits several futures concurrently inside one task.

mod utils;

use proc_macro::{TokenStream, TokenTree};

/// Awaits every future and returns their outputs as a tuple.
///
/// The futures are polled by the task that awaits the `join!`, one after
/// the other on every wake-up; futures that already completed are not
/// polled again.
#[proc_macro]
pub fn join(input: TokenStream) -> TokenStream {
    let args = utils::split_args(input);
    let count = args.len();

    if count == 0 {
        return "()".parse().unwrap_or_default();
    }

    if count == 1 {
        let expr = utils::tokens_to_string(&args[0]);
        return format!("{{ ({expr}).await }}")
            .parse()
            .unwrap_or_else(|err| utils::compile_error(&format!("join! macro error: {err}")));
    }

    let mut output = String::from("{\n");

    for (i, expr_tokens) in args.iter().enumerate() {
        let idx = i + 1;
        let expr = utils::tokens_to_string(expr_tokens);
        output.push_str(&format!(
            "let mut __f{idx} = (::std::boxed::Box::pin({expr}), ::core::option::Option::None);\n"
        ));
    }

    output.push_str("::std::future::poll_fn(move |cx| {\n");
    output.push_str("    use ::std::future::Future;\n");
    output.push_str("    use ::std::task::Poll;\n");

    for i in 1..=count {
        output.push_str(&format!(
            "    if __f{i}.1.is_none() {{\n\
                    if let Poll::Ready(val) = __f{i}.0.as_mut().poll(cx) {{\n\
                        __f{i}.1 = ::core::option::Option::Some(val);\n\
                    }}\n\
                }}\n"
        ));
    }

    let taken = (1..=count)
        .map(|i| format!("__f{i}.1.take()"))
        .collect::<Vec<_>>()
        .join(", ");
    let ready = (1..=count)
        .map(|i| format!("::core::option::Option::Some(__v{i})"))
        .collect::<Vec<_>>()
        .join(", ");
    let values = (1..=count)
        .map(|i| format!("__v{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let partial = (1..=count)
        .map(|i| format!("__o{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let restore = (1..=count)
        .map(|i| format!("__f{i}.1 = __o{i};"))
        .collect::<Vec<_>>()
        .join(" ");

    output.push_str(&format!(
        "    match ({taken}) {{\n\
                ({ready}) => Poll::Ready(({values})),\n\
                ({partial}) => {{ {restore} Poll::Pending }}\n\
            }}\n"
    ));
    output.push_str("}).await\n");
    output.push_str("}\n");

    output
        .parse::<TokenStream>()
        .unwrap_or_else(|err| utils::compile_error(&format!("join! macro error: {err}")))
}

/// Runs an `async fn main` on a spindle runtime.
///
/// ```rust,ignore
/// #[spindle::main(carrier_count = 4)]
/// async fn main() {
///     // ...
/// }
/// ```
#[proc_macro_attribute]
pub fn main(attr: TokenStream, item: TokenStream) -> TokenStream {
    utils::wrap_in_runtime(attr, item)
}

/// Runs an `async` test on a fresh spindle runtime.
///
/// Accepts the same `carrier_count = N` argument as `#[spindle::main]`.
#[proc_macro_attribute]
pub fn test(attr: TokenStream, item: TokenStream) -> TokenStream {
    let body = utils::wrap_in_runtime(attr, item);

    let mut result: Vec<TokenTree> = "#[test]"
        .parse::<TokenStream>()
        .unwrap_or_default()
        .into_iter()
        .collect();
    result.extend(body);

    result.into_iter().collect()
}
