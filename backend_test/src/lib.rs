use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one and inject
/// dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`],
/// `crate::model::common::FixedClock` (the server's clock, initially midday on
/// a voting day) and `crate::store::MemoryStore` (the server's storage).
///
/// Pass `voter` to have the client registered and logged in as the example
/// voter before the test starts.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract type information and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in the client as a voter if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        Some(arg) if arg == "voter" => quote! {{
            let response = rocket_client
                .post(uri!(crate::api::auth::register))
                .header(rocket::http::ContentType::JSON)
                .body(rocket::serde::json::json!(crate::model::api::RegisterRequest::example()).to_string())
                .dispatch()
                .await;
            assert_eq!(response.status(), rocket::http::Status::Created);
        }},
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected no argument or `voter`")
                .into_compile_error()
                .into();
        }
        None => quote! {},
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (
                rocket::local::asynchronous::Client,
                crate::model::common::FixedClock,
                crate::store::MemoryStore,
            ) {
                log4rs_test_utils::test_logging::init_logging_once_for(
                    ["dailyvote_backend"],
                    None,
                    None,
                );

                let (rocket, clock, store) = crate::test_rocket();
                let rocket_client = rocket::local::asynchronous::Client::tracked(rocket)
                    .await
                    .unwrap();

                #maybe_login

                (rocket_client, clock, store)
            }

            /// The test itself.
            #item_fn

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                #[allow(unused_variables)]
                let (rocket_client, clock, store) = setup().await;
                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<Ident>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut args: Vec<Ident> = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(segment) = type_path.path.segments.last() {
                    let injected = match segment.ident.to_string().as_str() {
                        "Client" => Some(format_ident!("rocket_client")),
                        "FixedClock" => Some(format_ident!("clock")),
                        "MemoryStore" => Some(format_ident!("store")),
                        _ => None,
                    };
                    if let Some(injected) = injected {
                        if args.contains(&injected) {
                            return Err(syn::Error::new(
                                input.span(),
                                format!("Test cannot accept more than one `{}`", segment.ident),
                            ));
                        }
                        args.push(injected);
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client`, `clock_ident: FixedClock` or `store_ident: MemoryStore`",
        ));
    }

    Ok(args)
}
