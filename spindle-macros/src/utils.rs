use proc_macro::{Delimiter, Group, TokenStream, TokenTree};

/// Splits a `TokenStream` into comma-separated arguments.
///
/// Commas inside groups are not split on, since a group is a single
/// `TokenTree`.
pub(crate) fn split_args(input: TokenStream) -> Vec<Vec<TokenTree>> {
    let mut args = Vec::new();
    let mut current = Vec::new();

    for token in input {
        match &token {
            TokenTree::Punct(p) if p.as_char() == ',' => {
                if !current.is_empty() {
                    args.push(current);
                    current = Vec::new();
                }
            }
            _ => current.push(token),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }

    args
}

/// Converts a slice of tokens into a Rust source string.
///
/// A space is inserted between consecutive identifiers to avoid accidental
/// token merging (e.g. `foo bar` vs `foobar`).
pub(crate) fn tokens_to_string(tokens: &[TokenTree]) -> String {
    let mut out = String::new();
    let mut prev_was_ident = false;

    for t in tokens {
        let is_ident = matches!(t, TokenTree::Ident(_));

        if prev_was_ident && is_ident {
            out.push(' ');
        }

        out.push_str(&t.to_string());
        prev_was_ident = is_ident;
    }

    out
}

/// Parses the arguments of `#[spindle::main]` / `#[spindle::test]`.
///
/// The only accepted argument is `carrier_count = N` with `N > 0`.
pub(crate) fn parse_carrier_count(attr: TokenStream) -> Result<Option<usize>, String> {
    let mut carrier_count = None;

    for arg in split_args(attr) {
        let text = tokens_to_string(&arg);

        let Some((key, value)) = text.split_once('=') else {
            return Err(format!("expected `key = value`, found `{text}`"));
        };

        match key.trim() {
            "carrier_count" => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => carrier_count = Some(n),
                _ => return Err(format!("`carrier_count` must be a positive integer, found `{}`", value.trim())),
            },
            other => return Err(format!("unknown attribute `{other}`, expected `carrier_count`")),
        }
    }

    Ok(carrier_count)
}

/// Rewrites `async fn name() { body }` into a synchronous function that
/// starts a runtime and blocks on `body`.
pub(crate) fn wrap_in_runtime(attr: TokenStream, item: TokenStream) -> TokenStream {
    let carrier_count = match parse_carrier_count(attr) {
        Ok(n) => n,
        Err(msg) => return compile_error(&msg),
    };

    let mut tokens: Vec<TokenTree> = item.into_iter().collect();

    let Some(async_pos) = tokens
        .iter()
        .position(|t| matches!(t, TokenTree::Ident(id) if id.to_string() == "async"))
    else {
        return compile_error("the function must be declared `async`");
    };
    tokens.remove(async_pos);

    let Some(pos) = tokens
        .iter()
        .rposition(|t| matches!(t, TokenTree::Group(g) if g.delimiter() == Delimiter::Brace))
    else {
        return compile_error("expected a function body");
    };

    let TokenTree::Group(body) = &tokens[pos] else {
        return compile_error("expected a function body");
    };

    let mut builder = String::from("::spindle::RuntimeBuilder::new()");
    if let Some(n) = carrier_count {
        builder.push_str(&format!(".carrier_count({n})"));
    }

    let new_block = format!(
        "{{
            let runtime = match {builder}.build() {{
                ::core::result::Result::Ok(runtime) => runtime,
                ::core::result::Result::Err(err) => panic!(\"failed to start spindle runtime: {{err}}\"),
            }};

            match runtime.block_on(async move {{ {} }}) {{
                ::core::result::Result::Ok(value) => value,
                ::core::result::Result::Err(err) => panic!(\"spindle runtime error: {{err}}\"),
            }}
        }}",
        body.stream()
    );

    match new_block.parse() {
        Ok(stream) => tokens[pos] = TokenTree::Group(Group::new(Delimiter::Brace, stream)),
        Err(err) => return compile_error(&err.to_string()),
    }

    tokens.into_iter().collect()
}

pub(crate) fn compile_error(msg: &str) -> TokenStream {
    format!("::core::compile_error!({msg:?});")
        .parse()
        .unwrap_or_default()
}
